//! Constants used throughout the outreach core crate.

/// Environment variable naming a JSON patient file.
pub const PATIENT_DATA_ENV: &str = "OUTREACH_PATIENT_DATA";

/// Environment variable naming a YAML cohort catalog file.
pub const COHORT_CATALOG_ENV: &str = "OUTREACH_COHORT_CATALOG";

/// Cohort key for diabetes management.
pub const DIABETIC: &str = "diabetic";

/// Cohort key for weight management.
pub const OBESITY: &str = "obesity";

/// Cohort key for preventive cancer screening.
pub const CANCER_SCREENING: &str = "cancer_screening";

/// Number of key indicators shown per cohort in a catalog summary.
pub const SUMMARY_INDICATOR_COUNT: usize = 3;

/// Supporting-fact fragments counted as obesity complications.
pub const OBESITY_COMPLICATION_TERMS: [&str; 2] = ["sleep apnea", "metabolic"];

/// HbA1c (%) above which glucose control needs attention.
pub const HBA1C_THRESHOLD: f64 = 7.0;

/// Fasting glucose (mg/dL) above which intervention is suggested.
pub const FASTING_GLUCOSE_THRESHOLD: f64 = 130.0;

/// BMI at or above which a patient counts as obese.
pub const OBESITY_BMI: f64 = 30.0;

/// BMI at or above which weight management is urgent.
pub const SEVERE_OBESITY_BMI: f64 = 35.0;
