//! Intervention evaluation.
//!
//! Assembles the evidence a decision policy needs to decide whether a cohort
//! member warrants outreach. No decision is made here.

use crate::catalog::{CohortCatalog, CriteriaKind, Intervention};
use crate::constants::{CANCER_SCREENING, DIABETIC, OBESITY, OBESITY_COMPLICATION_TERMS};
use crate::error::{OutreachError, OutreachResult};
use crate::patient::{Bmi, Patient};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiabeticMetrics {
    pub hba1c: Option<f64>,
    pub glucose: Option<f64>,
    pub medication_adherence: Option<String>,
    pub medications: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObesityMetrics {
    pub bmi: Option<Bmi>,
    pub weight_trend: Option<String>,
    pub exercise_compliance: Option<String>,
    /// Supporting facts naming a weight-related complication.
    pub complications: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CancerScreeningMetrics {
    pub age: Option<u32>,
    pub screening_status: Option<String>,
    /// Last colonoscopy, falling back to last mammography.
    pub last_screening: Option<String>,
    pub family_history: Vec<String>,
}

/// Serialises as `{}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NoMetrics {}

/// Cohort-specific projection of a patient record.
///
/// Serialises as a plain mapping of metric name to value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CohortMetrics {
    Diabetic(DiabeticMetrics),
    Obesity(ObesityMetrics),
    CancerScreening(CancerScreeningMetrics),
    /// Cohorts without a registered metrics schema.
    Empty(NoMetrics),
}

impl CohortMetrics {
    /// Projects the metrics schema registered for `cohort`.
    pub fn project(patient: &Patient, cohort: &str) -> Self {
        match cohort {
            DIABETIC => CohortMetrics::Diabetic(DiabeticMetrics {
                hba1c: patient.last_hba1c,
                glucose: patient.fasting_glucose,
                medication_adherence: patient.medication_adherence.clone(),
                medications: patient.medications.clone().unwrap_or_default(),
            }),
            OBESITY => CohortMetrics::Obesity(ObesityMetrics {
                bmi: patient.bmi.clone(),
                weight_trend: patient.current_weight_trend.clone(),
                exercise_compliance: patient.exercise_compliance.clone(),
                complications: patient
                    .supporting_facts
                    .iter()
                    .filter(|fact| {
                        let fact = fact.to_lowercase();
                        OBESITY_COMPLICATION_TERMS
                            .iter()
                            .any(|term| fact.contains(term))
                    })
                    .cloned()
                    .collect(),
            }),
            CANCER_SCREENING => CohortMetrics::CancerScreening(CancerScreeningMetrics {
                age: patient.age,
                screening_status: patient.screening_status.clone(),
                last_screening: non_blank(&patient.last_colonoscopy)
                    .or_else(|| non_blank(&patient.last_mammography)),
                family_history: patient.family_history.clone().unwrap_or_default(),
            }),
            _ => CohortMetrics::Empty(NoMetrics::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CohortMetrics::Empty(_))
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Evidence for an intervention decision on one patient/cohort pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterventionAnalysis {
    pub cohort: String,
    pub patient_id: i64,
    /// The cohort's intervention criteria, in catalog order.
    pub criteria: Vec<String>,
    pub supporting_facts: Vec<String>,
    pub metrics: CohortMetrics,
}

/// Builds the intervention analysis for `patient` in `cohort`.
///
/// # Errors
///
/// Returns [`OutreachError::CohortNotFound`] if the catalog has no such cohort.
pub fn evaluate(
    patient: &Patient,
    catalog: &CohortCatalog,
    cohort: &str,
) -> OutreachResult<InterventionAnalysis> {
    let definition = catalog.get(cohort).ok_or_else(|| {
        tracing::warn!("evaluation requested for unknown cohort '{}'", cohort);
        OutreachError::CohortNotFound(cohort.to_string())
    })?;

    Ok(InterventionAnalysis {
        cohort: definition.key.clone(),
        patient_id: patient.id,
        criteria: definition.criteria(CriteriaKind::Intervention).to_vec(),
        supporting_facts: patient.supporting_facts.clone(),
        metrics: CohortMetrics::project(patient, &definition.key),
    })
}

/// Evaluates each cohort independently; a missing cohort yields an error entry
/// and does not stop the batch.
pub fn evaluate_all<S: AsRef<str>>(
    patient: &Patient,
    catalog: &CohortCatalog,
    cohorts: &[S],
) -> Vec<(String, OutreachResult<InterventionAnalysis>)> {
    cohorts
        .iter()
        .map(|cohort| {
            let cohort = cohort.as_ref();
            (cohort.to_string(), evaluate(patient, catalog, cohort))
        })
        .collect()
}

/// Lab values included in a [`MedicalSnapshot`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabValues {
    pub hba1c: Option<f64>,
    pub glucose: Option<f64>,
    pub blood_pressure: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MedicalSnapshot {
    pub age: Option<u32>,
    pub medications: Vec<String>,
    pub bmi: Option<Bmi>,
    pub lab_values: LabValues,
}

/// Evidence for confirming that a patient really belongs to a cohort.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MembershipEvidence {
    pub cohort: String,
    pub patient_id: i64,
    pub classification_criteria: Vec<String>,
    pub key_indicators: Vec<String>,
    pub supporting_facts: Vec<String>,
    pub medical_data: MedicalSnapshot,
}

pub fn evaluate_membership(
    patient: &Patient,
    catalog: &CohortCatalog,
    cohort: &str,
) -> OutreachResult<MembershipEvidence> {
    let definition = catalog
        .get(cohort)
        .ok_or_else(|| OutreachError::CohortNotFound(cohort.to_string()))?;

    Ok(MembershipEvidence {
        cohort: definition.key.clone(),
        patient_id: patient.id,
        classification_criteria: definition.classification_criteria.clone(),
        key_indicators: definition.key_indicators.clone(),
        supporting_facts: patient.supporting_facts.clone(),
        medical_data: MedicalSnapshot {
            age: patient.age,
            medications: patient.medications.clone().unwrap_or_default(),
            bmi: patient.bmi.clone(),
            lab_values: LabValues {
                hba1c: patient.last_hba1c,
                glucose: patient.fasting_glucose,
                blood_pressure: patient.blood_pressure.clone(),
            },
        },
    })
}

/// An analysis paired with the interventions its cohort offers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterventionOptions {
    pub cohort: String,
    pub patient_id: i64,
    pub patient_name: String,
    pub available: Vec<Intervention>,
    pub analysis: InterventionAnalysis,
}

pub fn intervention_options(
    patient: &Patient,
    catalog: &CohortCatalog,
    analysis: InterventionAnalysis,
) -> OutreachResult<InterventionOptions> {
    let definition = catalog
        .get(&analysis.cohort)
        .ok_or_else(|| OutreachError::CohortNotFound(analysis.cohort.clone()))?;

    Ok(InterventionOptions {
        cohort: definition.key.clone(),
        patient_id: patient.id,
        patient_name: patient.name.clone(),
        available: definition.available_interventions.clone(),
        analysis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::PatientStore;

    fn patient(id: i64, facts: &[&str]) -> Patient {
        Patient::new(id, "Test Patient", facts.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn diabetic_metrics_scenario() {
        let catalog = CohortCatalog::builtin();
        let mut p = patient(5, &["Type 2 diabetes", "HbA1c 8.2%"]);
        p.last_hba1c = Some(8.2);

        let analysis = evaluate(&p, &catalog, DIABETIC).unwrap();
        assert_eq!(analysis.cohort, DIABETIC);
        assert_eq!(
            analysis.criteria,
            catalog.criteria_for(DIABETIC, CriteriaKind::Intervention)
        );
        match &analysis.metrics {
            CohortMetrics::Diabetic(m) => {
                assert_eq!(m.hba1c, Some(8.2));
                assert_eq!(m.glucose, None);
                assert!(m.medications.is_empty());
            }
            other => panic!("expected diabetic metrics, got {other:?}"),
        }
    }

    #[test]
    fn obesity_complications_include_sleep_apnea() {
        let catalog = CohortCatalog::builtin();
        let p = patient(2, &["obesity", "Sleep Apnea", "Metabolic syndrome", "knee pain"]);

        let analysis = evaluate(&p, &catalog, OBESITY).unwrap();
        match &analysis.metrics {
            CohortMetrics::Obesity(m) => {
                assert_eq!(m.complications, vec!["Sleep Apnea", "Metabolic syndrome"]);
            }
            other => panic!("expected obesity metrics, got {other:?}"),
        }
    }

    #[test]
    fn last_screening_falls_back_to_mammography() {
        let catalog = CohortCatalog::builtin();
        let mut p = patient(3, &["due for mammography"]);
        p.last_colonoscopy = Some("  ".into());
        p.last_mammography = Some("2021-06-01".into());
        p.age = Some(55);

        let analysis = evaluate(&p, &catalog, CANCER_SCREENING).unwrap();
        match &analysis.metrics {
            CohortMetrics::CancerScreening(m) => {
                assert_eq!(m.last_screening.as_deref(), Some("2021-06-01"));
                assert_eq!(m.age, Some(55));
                assert!(m.family_history.is_empty());
            }
            other => panic!("expected cancer screening metrics, got {other:?}"),
        }

        p.last_colonoscopy = Some("2019-03-14".into());
        let analysis = evaluate(&p, &catalog, CANCER_SCREENING).unwrap();
        match analysis.metrics {
            CohortMetrics::CancerScreening(m) => {
                assert_eq!(m.last_screening.as_deref(), Some("2019-03-14"))
            }
            other => panic!("expected cancer screening metrics, got {other:?}"),
        }
    }

    #[test]
    fn unknown_cohort_is_not_found() {
        let catalog = CohortCatalog::builtin();
        let p = patient(1, &["diabetes"]);
        let err = evaluate(&p, &catalog, "nonexistent_cohort").unwrap_err();
        assert!(matches!(err, OutreachError::CohortNotFound(ref c) if c == "nonexistent_cohort"));
        assert!(err.is_not_found());
    }

    #[test]
    fn cohort_without_metrics_schema_yields_empty_metrics() {
        let catalog = CohortCatalog::from_yaml_str(
            "asthma:\n  name: Asthma\n  intervention_criteria: [Night symptoms]\n  key_indicators: [asthma]\n",
        )
        .unwrap();
        let p = patient(1, &["asthma"]);

        let analysis = evaluate(&p, &catalog, "asthma").unwrap();
        assert!(analysis.metrics.is_empty());
        assert_eq!(analysis.criteria, vec!["Night symptoms"]);
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["metrics"], serde_json::json!({}));
    }

    #[test]
    fn metrics_serialise_as_plain_mapping() {
        let store = PatientStore::demo();
        let catalog = CohortCatalog::builtin();
        let analysis = evaluate(store.get(6).unwrap(), &catalog, OBESITY).unwrap();
        let json = serde_json::to_value(&analysis.metrics).unwrap();
        assert_eq!(json["bmi"], serde_json::json!(">40"));
        assert_eq!(json["complications"], serde_json::json!(["Metabolic syndrome"]));
    }

    #[test]
    fn evaluate_all_continues_past_missing_cohort() {
        let catalog = CohortCatalog::builtin();
        let p = patient(1, &["diabetes", "obese"]);
        let results = evaluate_all(&p, &catalog, &[DIABETIC, "bogus", OBESITY]);

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(OutreachError::CohortNotFound(_))));
        assert_eq!(results[2].0, OBESITY);
        assert!(results[2].1.is_ok());
    }

    #[test]
    fn membership_evidence_includes_snapshot() {
        let store = PatientStore::demo();
        let catalog = CohortCatalog::builtin();
        let evidence = evaluate_membership(store.get(1).unwrap(), &catalog, DIABETIC).unwrap();

        assert_eq!(evidence.key_indicators, catalog.key_indicators(DIABETIC));
        assert_eq!(evidence.medical_data.lab_values.hba1c, Some(7.8));
        assert_eq!(
            evidence.medical_data.lab_values.blood_pressure.as_deref(),
            Some("148/92")
        );
        assert!(evaluate_membership(store.get(1).unwrap(), &catalog, "bogus").is_err());
    }

    #[test]
    fn intervention_options_list_cohort_interventions() {
        let store = PatientStore::demo();
        let catalog = CohortCatalog::builtin();
        let aisha = store.get(5).unwrap();
        let analysis = evaluate(aisha, &catalog, DIABETIC).unwrap();

        let options = intervention_options(aisha, &catalog, analysis).unwrap();
        assert_eq!(options.patient_name, "Aisha Khan");
        assert_eq!(options.available.len(), 4);
        assert!(options.available.iter().any(|i| i.kind == "hba1c_testing"));
    }
}
