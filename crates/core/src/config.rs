//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the core.
//! Nothing in the core reads environment variables while handling a request.

use crate::catalog::CohortCatalog;
use crate::error::{OutreachError, OutreachResult};
use crate::patient::PatientStore;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug, Default)]
pub struct CoreConfig {
    patient_data_file: Option<PathBuf>,
    cohort_catalog_file: Option<PathBuf>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `None` selects the built-in data set for that input. Provided paths must
    /// point at existing files.
    pub fn new(
        patient_data_file: Option<PathBuf>,
        cohort_catalog_file: Option<PathBuf>,
    ) -> OutreachResult<Self> {
        for (label, path) in [
            ("patient data", &patient_data_file),
            ("cohort catalog", &cohort_catalog_file),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(OutreachError::InvalidInput(format!(
                        "{label} path is not a file: {}",
                        path.display()
                    )));
                }
            }
        }

        Ok(Self {
            patient_data_file,
            cohort_catalog_file,
        })
    }

    pub fn patient_data_file(&self) -> Option<&Path> {
        self.patient_data_file.as_deref()
    }

    pub fn cohort_catalog_file(&self) -> Option<&Path> {
        self.cohort_catalog_file.as_deref()
    }

    /// Loads the configured catalog, or the built-in one.
    pub fn load_catalog(&self) -> OutreachResult<CohortCatalog> {
        match &self.cohort_catalog_file {
            Some(path) => CohortCatalog::load(path),
            None => Ok(CohortCatalog::builtin()),
        }
    }

    /// Loads the configured patients, or the demonstration set.
    pub fn load_patients(&self) -> OutreachResult<PatientStore> {
        match &self.patient_data_file {
            Some(path) => PatientStore::load(path),
            None => {
                tracing::info!("no patient data file configured; using demonstration patients");
                Ok(PatientStore::demo())
            }
        }
    }
}

/// Parse an optional path from an environment variable value.
///
/// `None`, empty and whitespace-only values select the built-in default.
pub fn path_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
