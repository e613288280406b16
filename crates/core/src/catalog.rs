//! Cohort catalog.
//!
//! Static reference data describing every cohort the outreach workflow knows about:
//! how a patient is recognised as a member (classification criteria and key
//! indicators), when outreach is warranted (intervention criteria), and which
//! reminders can be sent (available interventions with message templates).
//!
//! The catalog is built once (either the built-in set or a YAML file) and is
//! read-only afterwards. Cohort enumeration order is significant: classification
//! results follow it.

use crate::constants::{CANCER_SCREENING, DIABETIC, OBESITY, SUMMARY_INDICATOR_COUNT};
use crate::error::{OutreachError, OutreachResult};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single outreach action offered to members of a cohort.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Intervention {
    /// Reminder type, e.g. `hba1c_testing`.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub message_template: String,
}

/// Which criteria list of a cohort to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CriteriaKind {
    Classification,
    Intervention,
}

/// Definition of one cohort.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CohortDefinition {
    pub key: String,
    pub display_name: String,
    pub description: String,
    pub classification_criteria: Vec<String>,
    pub intervention_criteria: Vec<String>,
    /// Lowercase, de-duplicated, in declaration order.
    pub key_indicators: Vec<String>,
    pub available_interventions: Vec<Intervention>,
}

impl CohortDefinition {
    pub fn criteria(&self, kind: CriteriaKind) -> &[String] {
        match kind {
            CriteriaKind::Classification => &self.classification_criteria,
            CriteriaKind::Intervention => &self.intervention_criteria,
        }
    }

    /// Looks up an available intervention by its reminder type.
    pub fn intervention(&self, kind: &str) -> Option<&Intervention> {
        self.available_interventions.iter().find(|i| i.kind == kind)
    }
}

/// Wire shape of a cohort entry in a YAML catalog file. The cohort key is the
/// mapping key, so it is not repeated here.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CohortEntry {
    #[serde(alias = "name")]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    classification_criteria: Vec<String>,
    #[serde(default)]
    intervention_criteria: Vec<String>,
    #[serde(default)]
    key_indicators: Vec<String>,
    #[serde(default)]
    available_interventions: Vec<Intervention>,
}

impl CohortEntry {
    fn into_definition(self, key: String) -> OutreachResult<CohortDefinition> {
        let key_indicators = normalise_indicators(&key, self.key_indicators)?;
        Ok(CohortDefinition {
            key,
            display_name: self.display_name,
            description: self.description,
            classification_criteria: self.classification_criteria,
            intervention_criteria: self.intervention_criteria,
            key_indicators,
            available_interventions: self.available_interventions,
        })
    }
}

fn normalise_indicators(key: &str, raw: Vec<String>) -> OutreachResult<Vec<String>> {
    let mut indicators: Vec<String> = Vec::with_capacity(raw.len());
    for indicator in raw {
        let indicator = indicator.trim().to_lowercase();
        if indicator.is_empty() {
            return Err(OutreachError::InvalidInput(format!(
                "cohort '{key}' has an empty key indicator"
            )));
        }
        if !indicators.contains(&indicator) {
            indicators.push(indicator);
        }
    }
    Ok(indicators)
}

/// Per-cohort line of a [`CatalogSummary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CohortOverview {
    pub name: String,
    pub description: String,
    pub key_indicators: Vec<String>,
    pub intervention_count: usize,
}

/// Quick-reference overview of the whole catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub total_cohorts: usize,
    #[serde(serialize_with = "ordered_map")]
    pub cohort_overview: Vec<(String, CohortOverview)>,
}

fn ordered_map<S>(entries: &[(String, CohortOverview)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, overview) in entries {
        map.serialize_entry(key, overview)?;
    }
    map.end()
}

/// Ordered, read-only collection of cohort definitions.
#[derive(Clone, Debug, PartialEq)]
pub struct CohortCatalog {
    cohorts: Vec<CohortDefinition>,
}

impl CohortCatalog {
    /// Builds a catalog from definitions, rejecting duplicate or blank keys.
    pub fn new(cohorts: Vec<CohortDefinition>) -> OutreachResult<Self> {
        for (i, cohort) in cohorts.iter().enumerate() {
            if cohort.key.trim().is_empty() {
                return Err(OutreachError::InvalidInput(
                    "cohort key cannot be empty".into(),
                ));
            }
            if cohorts[..i].iter().any(|c| c.key == cohort.key) {
                return Err(OutreachError::InvalidInput(format!(
                    "duplicate cohort key '{}'",
                    cohort.key
                )));
            }
        }
        Ok(Self { cohorts })
    }

    /// Parses a YAML mapping of cohort key to definition.
    pub fn from_yaml_str(input: &str) -> OutreachResult<Self> {
        let mapping: serde_yaml::Mapping =
            serde_yaml::from_str(input).map_err(OutreachError::CatalogParse)?;

        let mut cohorts = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let key = match key {
                serde_yaml::Value::String(key) => key,
                other => {
                    return Err(OutreachError::InvalidInput(format!(
                        "cohort key must be a string, got {other:?}"
                    )))
                }
            };
            let entry: CohortEntry =
                serde_yaml::from_value(value).map_err(OutreachError::CatalogParse)?;
            cohorts.push(entry.into_definition(key)?);
        }

        Self::new(cohorts)
    }

    pub fn load(path: &Path) -> OutreachResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(OutreachError::FileRead)?;
        let catalog = Self::from_yaml_str(&contents)?;
        tracing::info!(
            "loaded {} cohort definitions from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// All definitions, in catalog order.
    pub fn get_all(&self) -> &[CohortDefinition] {
        &self.cohorts
    }

    pub fn get(&self, key: &str) -> Option<&CohortDefinition> {
        self.cohorts.iter().find(|c| c.key == key)
    }

    /// Criteria of the given kind, or an empty slice when the cohort is unknown.
    pub fn criteria_for(&self, key: &str, kind: CriteriaKind) -> &[String] {
        self.get(key).map(|c| c.criteria(kind)).unwrap_or(&[])
    }

    pub fn cohort_names(&self) -> Vec<&str> {
        self.cohorts.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn key_indicators(&self, key: &str) -> &[String] {
        self.get(key).map(|c| c.key_indicators.as_slice()).unwrap_or(&[])
    }

    pub fn available_interventions(&self, key: &str) -> &[Intervention] {
        self.get(key)
            .map(|c| c.available_interventions.as_slice())
            .unwrap_or(&[])
    }

    /// First intervention across the catalog with the given reminder type.
    pub fn intervention(&self, reminder_type: &str) -> Option<&Intervention> {
        self.cohorts
            .iter()
            .find_map(|c| c.intervention(reminder_type))
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            total_cohorts: self.cohorts.len(),
            cohort_overview: self
                .cohorts
                .iter()
                .map(|c| {
                    (
                        c.key.clone(),
                        CohortOverview {
                            name: c.display_name.clone(),
                            description: c.description.clone(),
                            key_indicators: c
                                .key_indicators
                                .iter()
                                .take(SUMMARY_INDICATOR_COUNT)
                                .cloned()
                                .collect(),
                            intervention_count: c.available_interventions.len(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CohortDefinition> {
        self.cohorts.iter()
    }
}

impl Default for CohortCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// Serialised as a JSON/YAML mapping in catalog order.
impl Serialize for CohortCatalog {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.cohorts.len()))?;
        for cohort in &self.cohorts {
            map.serialize_entry(&cohort.key, cohort)?;
        }
        map.end()
    }
}

// ============================================================================
// BUILT-IN CATALOG
// ============================================================================

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn interventions(items: &[(&str, &str, &str)]) -> Vec<Intervention> {
    items
        .iter()
        .map(|(kind, description, template)| Intervention {
            kind: kind.to_string(),
            description: description.to_string(),
            message_template: template.to_string(),
        })
        .collect()
}

impl CohortCatalog {
    /// The reference catalog: diabetic, obesity and cancer screening cohorts.
    pub fn builtin() -> Self {
        let diabetic = CohortDefinition {
            key: DIABETIC.into(),
            display_name: "Diabetic Management".into(),
            description: "Patients with diabetes requiring ongoing management and monitoring"
                .into(),
            classification_criteria: strings(&[
                "Supporting facts include any form of diabetes (Type 1, Type 2, etc.)",
                "HbA1c levels documented in patient data",
                "Taking diabetes medications (Metformin, Insulin, etc.)",
                "Elevated fasting glucose levels (>126 mg/dL)",
                "History of diabetic complications",
            ]),
            intervention_criteria: strings(&[
                "HbA1c > 7.0% indicates need for better glucose control",
                "Fasting glucose > 130 mg/dL suggests intervention needed",
                "Poor medication adherence or missed refills",
                "Poor glucose monitoring compliance",
                "Recent complications or concerning symptoms",
            ]),
            key_indicators: strings(&[
                "diabetes",
                "diabetic",
                "hba1c",
                "insulin",
                "metformin",
                "glucose",
                "blood sugar",
                "diabetic retinopathy",
            ]),
            available_interventions: interventions(&[
                (
                    "medication_adherence",
                    "Reminder about taking diabetes medications consistently",
                    "Don't forget to take your diabetes medication as prescribed. Consistent medication helps control blood sugar.",
                ),
                (
                    "glucose_monitoring",
                    "Reminder to check blood glucose levels regularly",
                    "Please remember to check your blood glucose levels daily and log the results.",
                ),
                (
                    "routine_followup",
                    "Reminder for regular diabetes check-up appointments",
                    "It's time to schedule your routine diabetes follow-up appointment with your healthcare provider.",
                ),
                (
                    "hba1c_testing",
                    "Reminder for HbA1c lab testing",
                    "You're due for your HbA1c test to monitor your diabetes control over the past 3 months.",
                ),
            ]),
        };

        let obesity = CohortDefinition {
            key: OBESITY.into(),
            display_name: "Obesity Management".into(),
            description: "Patients with BMI ≥30 requiring weight management support".into(),
            classification_criteria: strings(&[
                "BMI ≥30 or supporting facts explicitly mention obesity",
                "Weight-related health conditions (sleep apnea, metabolic syndrome)",
                "Joint problems related to excess weight",
                "Documentation of weight management needs",
            ]),
            intervention_criteria: strings(&[
                "BMI ≥35 (severe obesity) requires immediate intervention",
                "Weight-related complications (sleep apnea, joint pain)",
                "No active weight management program in place",
                "Poor dietary habits or sedentary lifestyle",
                "Weight gain trend or lack of progress",
            ]),
            key_indicators: strings(&[
                "obesity",
                "obese",
                "bmi",
                "overweight",
                "weight management",
                "sleep apnea",
                "metabolic syndrome",
                "weight loss",
            ]),
            available_interventions: interventions(&[
                (
                    "weight_management",
                    "General weight management program reminder",
                    "Join our comprehensive weight management program to achieve your health goals safely and effectively.",
                ),
                (
                    "nutrition_counseling",
                    "Reminder for nutritionist consultation",
                    "Schedule a consultation with our registered dietitian to develop a personalized nutrition plan.",
                ),
                (
                    "exercise_program",
                    "Physical activity and exercise program",
                    "Our supervised exercise program can help you start a safe and effective fitness routine.",
                ),
                (
                    "behavioral_support",
                    "Behavioral and lifestyle modification support",
                    "Consider joining our behavioral support group to develop healthy lifestyle habits.",
                ),
            ]),
        };

        let cancer_screening = CohortDefinition {
            key: CANCER_SCREENING.into(),
            display_name: "Cancer Screening".into(),
            description: "Patients due for preventive cancer screening".into(),
            classification_criteria: strings(&[
                "Age-appropriate for cancer screening (varies by screening type)",
                "Family history of cancer",
                "Overdue for routine cancer screening",
                "High-risk factors for specific cancers",
            ]),
            intervention_criteria: strings(&[
                "Overdue for age-appropriate screening (>1 year past due)",
                "High-risk family history without recent screening",
                "Never had baseline screening at appropriate age",
                "Concerning symptoms requiring follow-up",
                "Previous abnormal results requiring monitoring",
            ]),
            key_indicators: strings(&[
                "screening",
                "cancer",
                "family history",
                "overdue",
                "colonoscopy",
                "mammography",
                "pap smear",
                "risk factors",
            ]),
            available_interventions: interventions(&[
                (
                    "overdue_screening",
                    "Reminder for overdue cancer screening",
                    "You are overdue for your cancer screening. Please contact us to schedule your appointment.",
                ),
                (
                    "screening_reminder",
                    "General screening reminder",
                    "It's time for your routine cancer screening. Early detection saves lives.",
                ),
                (
                    "appointment_scheduling",
                    "Help with scheduling screening appointment",
                    "We can help you schedule your cancer screening appointment. Call us at your convenience.",
                ),
                (
                    "high_risk_counseling",
                    "Genetic counseling for high-risk patients",
                    "Given your family history, consider genetic counseling to assess your cancer risk.",
                ),
            ]),
        };

        Self {
            cohorts: vec![diabetic, obesity, cancer_screening],
        }
    }
}
