//! REST request and response bodies.
//!
//! Core types are carried as-is; their OpenAPI schema is a free-form object.

use outreach_core::{Patient, Priority, ReminderRecord, RunId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ListPatientsRes {
    #[schema(value_type = Vec<Object>)]
    pub patients: Vec<Patient>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SearchPatientsReq {
    pub terms: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BeginRunRes {
    #[schema(value_type = String)]
    pub run_id: RunId,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DispatchReminderReq {
    pub patient_id: i64,
    pub reminder_type: String,
    /// One of `low`, `normal`, `high`, `urgent`. Defaults to `normal`.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub priority: Priority,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DispatchReminderRes {
    #[schema(value_type = Object)]
    pub reminder: ReminderRecord,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ListRemindersRes {
    #[schema(value_type = String)]
    pub run_id: RunId,
    #[schema(value_type = Vec<Object>)]
    pub reminders: Vec<ReminderRecord>,
}

/// Error body returned with every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Stable machine-readable kind, e.g. `duplicate_dispatch`.
    pub error: String,
    pub message: String,
}
