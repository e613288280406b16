//! Intervention decision policies.
//!
//! A [`DecisionPolicy`] turns an [`InterventionAnalysis`] into an outreach
//! decision. The engine never decides on its own: the caller supplies the policy,
//! whether that is a rule table, a human reviewer, or an external planner.

use crate::catalog::CohortDefinition;
use crate::constants::{
    FASTING_GLUCOSE_THRESHOLD, HBA1C_THRESHOLD, OBESITY_BMI, SEVERE_OBESITY_BMI,
};
use crate::dispatch::Priority;
use crate::evaluator::{
    CancerScreeningMetrics, CohortMetrics, DiabeticMetrics, InterventionAnalysis, ObesityMetrics,
};
use serde::Serialize;

/// A chosen reminder for one patient/cohort pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub cohort: String,
    pub reminder_type: String,
    pub priority: Priority,
}

pub trait DecisionPolicy {
    /// Returns `None` when the analysis does not warrant outreach.
    fn decide(
        &self,
        cohort: &CohortDefinition,
        analysis: &InterventionAnalysis,
    ) -> Option<Decision>;
}

/// Rule table over the built-in cohorts' intervention criteria.
///
/// Only reminder types the cohort actually offers are chosen, so a catalog that
/// drops an intervention also disables its rule.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleTablePolicy;

impl RuleTablePolicy {
    fn diabetic(m: &DiabeticMetrics) -> Option<(&'static str, Priority)> {
        if m.hba1c.is_some_and(|v| v > HBA1C_THRESHOLD) {
            return Some(("hba1c_testing", Priority::High));
        }
        if m.glucose.is_some_and(|v| v > FASTING_GLUCOSE_THRESHOLD) {
            return Some(("glucose_monitoring", Priority::Normal));
        }
        let poor_adherence = m.medication_adherence.as_deref().is_some_and(|a| {
            let a = a.to_lowercase();
            a.contains("poor") || a.contains("missed")
        });
        if poor_adherence {
            return Some(("medication_adherence", Priority::Normal));
        }
        None
    }

    fn obesity(m: &ObesityMetrics) -> Option<(&'static str, Priority)> {
        let bmi = m.bmi.as_ref().and_then(|b| b.approx());
        if bmi.is_some_and(|b| b >= SEVERE_OBESITY_BMI) {
            return Some(("weight_management", Priority::High));
        }
        if !m.complications.is_empty() {
            return Some(("weight_management", Priority::Normal));
        }
        if bmi.is_some_and(|b| b >= OBESITY_BMI) {
            return Some(("nutrition_counseling", Priority::Normal));
        }
        None
    }

    fn cancer_screening(m: &CancerScreeningMetrics) -> Option<(&'static str, Priority)> {
        let overdue = m
            .screening_status
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains("overdue"));
        if overdue {
            return Some(("overdue_screening", Priority::High));
        }
        if !m.family_history.is_empty() && m.last_screening.is_none() {
            return Some(("high_risk_counseling", Priority::Normal));
        }
        None
    }
}

impl DecisionPolicy for RuleTablePolicy {
    fn decide(
        &self,
        cohort: &CohortDefinition,
        analysis: &InterventionAnalysis,
    ) -> Option<Decision> {
        let (reminder_type, priority) = match &analysis.metrics {
            CohortMetrics::Diabetic(m) => Self::diabetic(m),
            CohortMetrics::Obesity(m) => Self::obesity(m),
            CohortMetrics::CancerScreening(m) => Self::cancer_screening(m),
            CohortMetrics::Empty(_) => None,
        }?;

        if cohort.intervention(reminder_type).is_none() {
            tracing::debug!(
                "cohort '{}' does not offer '{}'; no decision",
                cohort.key,
                reminder_type
            );
            return None;
        }

        Some(Decision {
            cohort: cohort.key.clone(),
            reminder_type: reminder_type.to_string(),
            priority,
        })
    }
}
