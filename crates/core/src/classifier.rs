//! Cohort classification.
//!
//! A patient is a candidate member of a cohort when any of the cohort's key
//! indicators is a case-insensitive substring of any supporting fact. Every cohort
//! is checked independently, so a patient may land in zero, one or several
//! cohorts. Results follow catalog order.

use crate::catalog::CohortCatalog;
use crate::constants::{CANCER_SCREENING, DIABETIC, OBESITY, OBESITY_BMI};
use crate::patient::Patient;
use serde::Serialize;

/// Cohorts a patient was matched to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub patient_id: i64,
    /// Matched cohort keys, unique, in catalog order.
    pub matched_cohorts: Vec<String>,
}

impl Classification {
    pub fn contains(&self, cohort: &str) -> bool {
        self.matched_cohorts.iter().any(|c| c == cohort)
    }

    pub fn is_empty(&self) -> bool {
        self.matched_cohorts.is_empty()
    }
}

/// First indicator mentioned in the patient's supporting facts, if any.
pub fn matching_indicator<'a>(patient: &Patient, indicators: &'a [String]) -> Option<&'a str> {
    indicators
        .iter()
        .map(String::as_str)
        .find(|indicator| patient.mentions(indicator))
}

/// Classifies a patient against every cohort in the catalog.
pub fn classify(patient: &Patient, catalog: &CohortCatalog) -> Classification {
    let mut matched_cohorts = Vec::new();

    if !patient.supporting_facts.is_empty() {
        for cohort in catalog.iter() {
            if let Some(indicator) = matching_indicator(patient, &cohort.key_indicators) {
                tracing::debug!(
                    "patient {} matched cohort '{}' on indicator '{}'",
                    patient.id,
                    cohort.key,
                    indicator
                );
                matched_cohorts.push(cohort.key.clone());
            }
        }
    }

    Classification {
        patient_id: patient.id,
        matched_cohorts,
    }
}

// ============================================================================
// STRUCTURED-FIELD SIGNALS
// ============================================================================

/// Counts of structured-field signals per built-in cohort.
///
/// Diagnostic only. This heuristic reads structured attributes rather than key
/// indicators and can disagree with [`classify`], which stays authoritative.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndicatorSignals {
    pub diabetic: usize,
    pub cancer_screening: usize,
    pub obesity: usize,
}

impl IndicatorSignals {
    /// Single best-guess cohort: two diabetes signals win, then any cancer
    /// signal, then any obesity signal.
    pub fn dominant_cohort(&self) -> Option<&'static str> {
        if self.diabetic >= 2 {
            Some(DIABETIC)
        } else if self.cancer_screening >= 1 {
            Some(CANCER_SCREENING)
        } else if self.obesity >= 1 {
            Some(OBESITY)
        } else {
            None
        }
    }
}

pub fn indicator_signals(patient: &Patient) -> IndicatorSignals {
    let takes_metformin = patient
        .medications
        .as_ref()
        .is_some_and(|meds| meds.iter().any(|m| m.to_lowercase().contains("metformin")));

    let diabetic = [
        patient.last_hba1c.is_some(),
        patient.fasting_glucose.is_some(),
        patient.mentions("diabetes"),
        takes_metformin,
    ];

    let cancer_screening = [
        patient.family_history.is_some(),
        patient.last_colonoscopy.is_some(),
        patient.last_mammography.is_some(),
        patient.mentions("cancer"),
    ];

    let obesity = [
        patient
            .bmi
            .as_ref()
            .and_then(|bmi| bmi.approx())
            .is_some_and(|bmi| bmi >= OBESITY_BMI),
        patient.mentions("obesity"),
    ];

    let count = |signals: &[bool]| signals.iter().filter(|s| **s).count();

    IndicatorSignals {
        diabetic: count(&diabetic),
        cancer_screening: count(&cancer_screening),
        obesity: count(&obesity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{Bmi, PatientStore};

    fn patient(id: i64, facts: &[&str]) -> Patient {
        Patient::new(id, "Test Patient", facts.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn empty_supporting_facts_match_nothing() {
        let catalog = CohortCatalog::builtin();
        let mut p = patient(1, &[]);
        p.last_hba1c = Some(9.0);
        p.bmi = Some(Bmi::Value(41.0));
        assert!(classify(&p, &catalog).is_empty());
    }

    #[test]
    fn any_indicator_substring_places_patient_in_cohort() {
        let catalog = CohortCatalog::builtin();
        for cohort in catalog.iter() {
            for indicator in &cohort.key_indicators {
                let fact = format!("Noted: {} per chart", indicator.to_uppercase());
                let p = patient(1, &[&fact]);
                assert!(
                    classify(&p, &catalog).contains(&cohort.key),
                    "indicator '{indicator}' should place patient in '{}'",
                    cohort.key
                );
            }
        }
    }

    #[test]
    fn diabetic_scenario() {
        let catalog = CohortCatalog::builtin();
        let mut p = patient(5, &["Type 2 diabetes", "HbA1c 8.2%"]);
        p.last_hba1c = Some(8.2);
        let result = classify(&p, &catalog);
        assert_eq!(result.patient_id, 5);
        assert_eq!(result.matched_cohorts, vec![DIABETIC]);
    }

    #[test]
    fn family_history_scenario() {
        let catalog = CohortCatalog::builtin();
        let mut p = patient(7, &["family history of colon cancer"]);
        p.family_history = Some(vec!["colon cancer".into()]);
        assert_eq!(
            classify(&p, &catalog).matched_cohorts,
            vec![CANCER_SCREENING]
        );
    }

    #[test]
    fn multiple_cohorts_follow_catalog_order() {
        let catalog = CohortCatalog::builtin();
        // Facts listed in reverse catalog order on purpose.
        let p = patient(9, &["overdue mammography", "sleep apnea", "on insulin"]);
        assert_eq!(
            classify(&p, &catalog).matched_cohorts,
            vec![DIABETIC, OBESITY, CANCER_SCREENING]
        );
    }

    #[test]
    fn unrelated_facts_match_nothing() {
        let catalog = CohortCatalog::builtin();
        let p = patient(4, &["Seasonal allergies"]);
        assert!(classify(&p, &catalog).is_empty());
    }

    #[test]
    fn custom_catalog_drives_classification() {
        let catalog = CohortCatalog::from_yaml_str(
            "asthma:\n  name: Asthma\n  key_indicators: [Inhaler]\n",
        )
        .unwrap();
        let p = patient(1, &["Uses rescue inhaler weekly", "Type 2 diabetes"]);
        assert_eq!(classify(&p, &catalog).matched_cohorts, vec!["asthma"]);
    }

    #[test]
    fn matching_indicator_reports_first_hit() {
        let catalog = CohortCatalog::builtin();
        let p = patient(1, &["Blood sugar log reviewed", "Metformin 500mg"]);
        let diabetic = catalog.get(DIABETIC).unwrap();
        assert_eq!(
            matching_indicator(&p, &diabetic.key_indicators),
            Some("metformin")
        );
    }

    #[test]
    fn indicator_signals_count_structured_fields() {
        let store = PatientStore::demo();

        let aisha = store.get(5).unwrap();
        let signals = indicator_signals(aisha);
        assert_eq!(signals.diabetic, 4);
        assert_eq!(signals.dominant_cohort(), Some(DIABETIC));

        let tom = store.get(6).unwrap();
        let signals = indicator_signals(tom);
        assert_eq!(signals.obesity, 2);
        assert_eq!(signals.diabetic, 1);
        assert_eq!(signals.dominant_cohort(), Some(OBESITY));

        let robert = store.get(4).unwrap();
        assert_eq!(indicator_signals(robert).dominant_cohort(), None);
    }

    #[test]
    fn signals_can_disagree_with_classification() {
        let catalog = CohortCatalog::builtin();
        // One diabetes fact and nothing structured: classified, but below the
        // two-signal bar of the heuristic.
        let p = patient(1, &["diabetes screening discussed"]);
        assert!(classify(&p, &catalog).contains(DIABETIC));
        let signals = indicator_signals(&p);
        assert_eq!(signals.diabetic, 1);
        assert_eq!(signals.dominant_cohort(), None);
    }
}
