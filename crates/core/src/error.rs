use outreach_types::RunId;

#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to read data file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to parse patient data: {0}")]
    PatientDataParse(String),
    #[error("failed to parse cohort catalog: {0}")]
    CatalogParse(serde_yaml::Error),

    #[error("malformed patient record at index {index}: {reason}")]
    MalformedPatient { index: usize, reason: String },
    #[error("duplicate patient id {0} in patient data")]
    DuplicatePatientId(i64),

    #[error("patient {0} not found")]
    PatientNotFound(i64),
    #[error("cohort '{0}' not found")]
    CohortNotFound(String),

    #[error("patient {patient_id} already received a reminder in run {run_id}")]
    DuplicateDispatch { run_id: RunId, patient_id: i64 },
    #[error("failed to deliver reminder to patient {patient_id}: {reason}")]
    DispatchFailure { patient_id: i64, reason: String },
}

impl OutreachError {
    /// True for lookups that missed: callers scanning many ids or keys keep going.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OutreachError::PatientNotFound(_) | OutreachError::CohortNotFound(_)
        )
    }
}

pub type OutreachResult<T> = std::result::Result<T, OutreachError>;
