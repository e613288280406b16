//! Read-only data shared by every workflow run.

use crate::catalog::CohortCatalog;
use crate::config::CoreConfig;
use crate::error::OutreachResult;
use crate::patient::PatientStore;

/// Cohort catalog and patient store, built once and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreContext {
    catalog: CohortCatalog,
    patients: PatientStore,
}

impl CoreContext {
    pub fn new(catalog: CohortCatalog, patients: PatientStore) -> Self {
        Self { catalog, patients }
    }

    pub fn from_config(cfg: &CoreConfig) -> OutreachResult<Self> {
        Ok(Self::new(cfg.load_catalog()?, cfg.load_patients()?))
    }

    pub fn catalog(&self) -> &CohortCatalog {
        &self.catalog
    }

    pub fn patients(&self) -> &PatientStore {
        &self.patients
    }
}
