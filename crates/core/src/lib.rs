//! # Outreach Core
//!
//! Core business logic for the patient outreach workflow.
//!
//! This crate contains the deterministic engine behind outreach:
//! - Cohort catalog and patient store (read-only reference data)
//! - Classification of patients into cohorts by key indicators
//! - Intervention evaluation (evidence only; the decision belongs to a policy)
//! - Reminder dispatch with at most one reminder per patient per run
//!
//! **No API concerns**: HTTP servers, CLIs and the planner that drives the workflow
//! live outside this crate and call the functions exposed by [`OutreachService`].

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod patient;
pub mod policy;
pub mod run;

pub use catalog::{CatalogSummary, CohortCatalog, CohortDefinition, CriteriaKind, Intervention};
pub use classifier::{classify, indicator_signals, Classification, IndicatorSignals};
pub use config::CoreConfig;
pub use context::CoreContext;
pub use dispatch::{
    LogTransport, OutgoingReminder, Priority, ReminderDispatcher, ReminderRecord,
    ReminderTransport, TransportError,
};
pub use error::{OutreachError, OutreachResult};
pub use evaluator::{
    evaluate, evaluate_all, evaluate_membership, intervention_options, CohortMetrics,
    InterventionAnalysis, InterventionOptions, MembershipEvidence,
};
pub use patient::{Bmi, ContactInfo, Patient, PatientStore};
pub use policy::{Decision, DecisionPolicy, RuleTablePolicy};
pub use run::{FailedDispatch, OutreachRun, OutreachService, RunReport};

// Re-export shared primitives so callers need only this crate.
pub use outreach_types::{NonEmptyText, RunId};
