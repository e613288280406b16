//! Outreach service and workflow runs.
//!
//! [`OutreachService`] is the function-call surface offered to callers: patient
//! lookup, cohort listing, classification and evaluation over a shared read-only
//! [`CoreContext`]. Reminders are always sent within an [`OutreachRun`], which
//! scopes reminder deduplication to one run id.

use crate::catalog::CohortCatalog;
use crate::classifier::{self, Classification};
use crate::context::CoreContext;
use crate::dispatch::{OutgoingReminder, Priority, ReminderDispatcher, ReminderRecord};
use crate::error::{OutreachError, OutreachResult};
use crate::evaluator::{self, InterventionAnalysis, InterventionOptions, MembershipEvidence};
use crate::patient::Patient;
use crate::policy::{Decision, DecisionPolicy};
use outreach_types::{NonEmptyText, RunId};
use serde::Serialize;
use std::sync::Arc;

/// Pure outreach data operations - no API concerns
#[derive(Clone, Debug)]
pub struct OutreachService {
    ctx: Arc<CoreContext>,
    dispatcher: Arc<ReminderDispatcher>,
}

impl OutreachService {
    pub fn new(ctx: Arc<CoreContext>, dispatcher: Arc<ReminderDispatcher>) -> Self {
        Self { ctx, dispatcher }
    }

    pub fn context(&self) -> &CoreContext {
        &self.ctx
    }

    /// Starts a new run with a fresh id and an empty dispatch log.
    pub fn begin_run(&self) -> OutreachRun {
        let run = self.run(RunId::new());
        tracing::info!("started outreach run {}", run.id());
        run
    }

    /// Handle on an existing run, e.g. one started by an earlier request.
    pub fn run(&self, id: RunId) -> OutreachRun {
        OutreachRun {
            id,
            service: self.clone(),
        }
    }

    pub fn list_patients(&self) -> &[Patient] {
        self.ctx.patients().list()
    }

    pub fn get_patient(&self, id: i64) -> Option<&Patient> {
        self.ctx.patients().get(id)
    }

    pub fn search_patients(&self, terms: &[String]) -> Vec<&Patient> {
        self.ctx.patients().search(terms)
    }

    pub fn list_cohorts(&self) -> &CohortCatalog {
        self.ctx.catalog()
    }

    pub fn classify(&self, patient: &Patient) -> Classification {
        classifier::classify(patient, self.ctx.catalog())
    }

    pub fn evaluate(
        &self,
        patient: &Patient,
        cohort: &str,
    ) -> OutreachResult<InterventionAnalysis> {
        evaluator::evaluate(patient, self.ctx.catalog(), cohort)
    }

    pub fn evaluate_membership(
        &self,
        patient: &Patient,
        cohort: &str,
    ) -> OutreachResult<MembershipEvidence> {
        evaluator::evaluate_membership(patient, self.ctx.catalog(), cohort)
    }

    /// Evaluation plus the interventions the cohort offers.
    pub fn intervention_options(
        &self,
        patient: &Patient,
        cohort: &str,
    ) -> OutreachResult<InterventionOptions> {
        let analysis = self.evaluate(patient, cohort)?;
        evaluator::intervention_options(patient, self.ctx.catalog(), analysis)
    }
}

/// A failed delivery recorded in a [`RunReport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedDispatch {
    pub patient_id: i64,
    pub reminder_type: String,
    pub reason: String,
}

/// Outcome of [`OutreachRun::execute`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub sent: Vec<ReminderRecord>,
    /// Patients who already had a reminder in this run.
    pub duplicates: Vec<i64>,
    pub failures: Vec<FailedDispatch>,
    /// Patients for whom the policy chose no reminder.
    pub no_action: Vec<i64>,
}

impl RunReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            sent: Vec::new(),
            duplicates: Vec::new(),
            failures: Vec::new(),
            no_action: Vec::new(),
        }
    }
}

/// One outreach workflow run.
#[derive(Clone, Debug)]
pub struct OutreachRun {
    id: RunId,
    service: OutreachService,
}

impl OutreachRun {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn service(&self) -> &OutreachService {
        &self.service
    }

    /// Sends one reminder to a patient in this run.
    ///
    /// The message is taken from the first catalog intervention whose type
    /// matches `reminder_type`; unknown types are sent without a message.
    ///
    /// # Errors
    ///
    /// - [`OutreachError::InvalidInput`] if `reminder_type` is blank.
    /// - [`OutreachError::PatientNotFound`] if no such patient exists.
    /// - [`OutreachError::DuplicateDispatch`] if the patient already received a
    ///   reminder in this run.
    /// - [`OutreachError::DispatchFailure`] if delivery failed; retrying is allowed.
    pub fn dispatch_reminder(
        &self,
        patient_id: i64,
        reminder_type: &str,
        priority: Priority,
    ) -> OutreachResult<ReminderRecord> {
        let reminder_type = NonEmptyText::new(reminder_type)
            .map_err(|_| OutreachError::InvalidInput("reminder_type cannot be empty".into()))?;

        let ctx = self.service.context();
        let patient = ctx
            .patients()
            .get(patient_id)
            .ok_or(OutreachError::PatientNotFound(patient_id))?;

        let message = ctx
            .catalog()
            .intervention(reminder_type.as_str())
            .map(|i| i.message_template.clone());
        if message.is_none() {
            tracing::warn!(
                "no message template for reminder type '{}'; sending without message",
                reminder_type
            );
        }

        self.service.dispatcher.fire(OutgoingReminder {
            run_id: self.id,
            patient_id,
            patient_name: patient.name.clone(),
            phone: patient.phone.clone(),
            email: patient.email.clone(),
            reminder_type: reminder_type.as_str().to_string(),
            priority,
            message,
        })
    }

    /// Reminders delivered in this run so far.
    pub fn records(&self) -> Vec<ReminderRecord> {
        self.service.dispatcher.records(self.id)
    }

    /// Picks the reminder for one patient: the highest-priority decision across
    /// matched cohorts, earliest cohort on ties.
    pub fn plan(&self, patient: &Patient, policy: &dyn DecisionPolicy) -> Option<Decision> {
        let catalog = self.service.context().catalog();
        let classification = classifier::classify(patient, catalog);

        let mut best: Option<Decision> = None;
        for (cohort, result) in
            evaluator::evaluate_all(patient, catalog, classification.matched_cohorts.as_slice())
        {
            let (Some(definition), Ok(analysis)) = (catalog.get(&cohort), result) else {
                continue;
            };
            if let Some(decision) = policy.decide(definition, &analysis) {
                if best
                    .as_ref()
                    .map_or(true, |b| decision.priority > b.priority)
                {
                    best = Some(decision);
                }
            }
        }
        best
    }

    /// Runs the whole workflow: every patient is classified, evaluated and
    /// offered to `policy`; at most one reminder is sent per patient.
    ///
    /// Duplicate and failed dispatches are recorded in the report and do not stop
    /// the run. Executing the same run again retries failures only.
    pub fn execute(&self, policy: &dyn DecisionPolicy) -> OutreachResult<RunReport> {
        let mut report = RunReport::new(self.id);

        for patient in self.service.list_patients() {
            let Some(decision) = self.plan(patient, policy) else {
                report.no_action.push(patient.id);
                continue;
            };

            match self.dispatch_reminder(patient.id, &decision.reminder_type, decision.priority) {
                Ok(record) => report.sent.push(record),
                Err(OutreachError::DuplicateDispatch { patient_id, .. }) => {
                    report.duplicates.push(patient_id)
                }
                Err(OutreachError::DispatchFailure { patient_id, reason }) => {
                    report.failures.push(FailedDispatch {
                        patient_id,
                        reminder_type: decision.reminder_type,
                        reason,
                    })
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "run {} finished: {} sent, {} duplicate, {} failed, {} without action",
            self.id,
            report.sent.len(),
            report.duplicates.len(),
            report.failures.len(),
            report.no_action.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CohortCatalog;
    use crate::constants::{CANCER_SCREENING, DIABETIC, OBESITY};
    use crate::dispatch::{ReminderTransport, TransportError};
    use crate::evaluator::CohortMetrics;
    use crate::patient::PatientStore;
    use crate::policy::RuleTablePolicy;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service() -> OutreachService {
        let ctx = CoreContext::new(CohortCatalog::builtin(), PatientStore::demo());
        OutreachService::new(Arc::new(ctx), Arc::new(ReminderDispatcher::default()))
    }

    /// Fails deliveries to one patient while `failing` is set.
    struct FailFor {
        patient_id: i64,
        failing: Arc<AtomicBool>,
    }

    impl ReminderTransport for FailFor {
        fn deliver(&self, reminder: &OutgoingReminder) -> Result<(), TransportError> {
            if reminder.patient_id == self.patient_id && self.failing.load(Ordering::SeqCst) {
                return Err(TransportError("sms gateway timeout".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn surface_lookups() {
        let service = service();
        assert_eq!(service.list_patients().len(), 8);
        assert_eq!(service.get_patient(5).unwrap().name, "Aisha Khan");
        assert!(service.get_patient(404).is_none());
        assert_eq!(service.list_cohorts().len(), 3);
        assert_eq!(
            service.search_patients(&["colonoscopy".to_string()])[0].id,
            3
        );
    }

    #[test]
    fn classify_and_evaluate_scenario() {
        let service = service();
        let patient = service.get_patient(5).unwrap();
        assert_eq!(service.classify(patient).matched_cohorts, vec![DIABETIC]);

        let analysis = service.evaluate(patient, DIABETIC).unwrap();
        assert!(matches!(analysis.metrics, CohortMetrics::Diabetic(ref m) if m.hba1c == Some(8.2)));

        assert!(matches!(
            service.evaluate(patient, "nonexistent_cohort"),
            Err(OutreachError::CohortNotFound(_))
        ));
    }

    #[test]
    fn membership_and_options_for_matched_cohort() {
        let service = service();
        let patient = service.get_patient(7).unwrap();

        let evidence = service.evaluate_membership(patient, CANCER_SCREENING).unwrap();
        assert!(evidence.key_indicators.contains(&"family history".to_string()));
        assert_eq!(evidence.medical_data.age, Some(47));

        let options = service.intervention_options(patient, CANCER_SCREENING).unwrap();
        assert_eq!(options.patient_name, "Grace Liu");
        assert!(options
            .available
            .iter()
            .any(|i| i.kind == "high_risk_counseling"));
        assert!(service.intervention_options(patient, "nonexistent").is_err());
    }

    #[test]
    fn obesity_scenario_reports_sleep_apnea() {
        let service = service();
        let patient = Patient::new(30, "C", vec!["obesity".into(), "sleep apnea".into()]);
        assert!(service.classify(&patient).contains(OBESITY));

        let analysis = service.evaluate(&patient, OBESITY).unwrap();
        match analysis.metrics {
            CohortMetrics::Obesity(m) => assert!(m.complications.contains(&"sleep apnea".to_string())),
            other => panic!("expected obesity metrics, got {other:?}"),
        }
    }

    #[test]
    fn second_reminder_in_same_run_is_duplicate() {
        let service = service();
        let run = service.begin_run();

        let record = run
            .dispatch_reminder(5, "hba1c_testing", Priority::Normal)
            .unwrap();
        assert_eq!(record.run_id, run.id());
        assert_eq!(record.reminder_type, "hba1c_testing");

        let err = run
            .dispatch_reminder(5, "hba1c_testing", Priority::Normal)
            .unwrap_err();
        assert!(matches!(err, OutreachError::DuplicateDispatch { patient_id: 5, .. }));

        let records = run.records();
        assert_eq!(records.iter().filter(|r| r.patient_id == 5).count(), 1);
    }

    #[test]
    fn dispatch_validates_inputs() {
        let service = service();
        let run = service.begin_run();
        assert!(matches!(
            run.dispatch_reminder(404, "hba1c_testing", Priority::Normal),
            Err(OutreachError::PatientNotFound(404))
        ));
        assert!(matches!(
            run.dispatch_reminder(5, "  ", Priority::Normal),
            Err(OutreachError::InvalidInput(_))
        ));
        assert!(run.records().is_empty());
    }

    #[test]
    fn resumed_run_shares_dispatch_log() {
        let service = service();
        let run = service.begin_run();
        run.dispatch_reminder(7, "high_risk_counseling", Priority::Normal)
            .unwrap();

        let resumed = service.run(run.id());
        assert!(resumed
            .dispatch_reminder(7, "screening_reminder", Priority::Low)
            .is_err());

        let fresh = service.begin_run();
        assert!(fresh
            .dispatch_reminder(7, "screening_reminder", Priority::Low)
            .is_ok());
    }

    #[test]
    fn plan_prefers_highest_priority_then_catalog_order() {
        let service = service();
        let run = service.begin_run();

        // Tom matches diabetic (no rule fires) and obesity (BMI >40).
        let tom = service.get_patient(6).unwrap();
        let decision = run.plan(tom, &RuleTablePolicy).unwrap();
        assert_eq!(decision.cohort, OBESITY);
        assert_eq!(decision.reminder_type, "weight_management");

        let mut both = service.get_patient(5).unwrap().clone();
        both.supporting_facts.push("overdue screening".into());
        both.screening_status = Some("overdue".into());
        let decision = run.plan(&both, &RuleTablePolicy).unwrap();
        assert_eq!(decision.cohort, DIABETIC);
        assert_eq!(decision.priority, Priority::High);

        both.last_hba1c = Some(6.0);
        both.fasting_glucose = None;
        let decision = run.plan(&both, &RuleTablePolicy).unwrap();
        assert_eq!(decision.cohort, CANCER_SCREENING);
    }

    #[test]
    fn execute_sends_at_most_one_reminder_per_patient() {
        let service = service();
        let run = service.begin_run();

        let report = run.execute(&RuleTablePolicy).unwrap();
        let sent: Vec<(i64, &str)> = report
            .sent
            .iter()
            .map(|r| (r.patient_id, r.reminder_type.as_str()))
            .collect();
        assert_eq!(
            sent,
            vec![
                (1, "hba1c_testing"),
                (2, "weight_management"),
                (3, "overdue_screening"),
                (5, "hba1c_testing"),
                (6, "weight_management"),
                (7, "high_risk_counseling"),
            ]
        );
        assert_eq!(report.no_action, vec![4, 8]);
        assert!(report.duplicates.is_empty());
        assert!(report.failures.is_empty());

        let again = run.execute(&RuleTablePolicy).unwrap();
        assert!(again.sent.is_empty());
        assert_eq!(again.duplicates, vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(run.records().len(), 6);
    }

    #[test]
    fn failed_delivery_is_retried_on_next_execute() {
        let failing = Arc::new(AtomicBool::new(true));
        let transport = FailFor {
            patient_id: 3,
            failing: failing.clone(),
        };
        let ctx = CoreContext::new(CohortCatalog::builtin(), PatientStore::demo());
        let service = OutreachService::new(
            Arc::new(ctx),
            Arc::new(ReminderDispatcher::new(Box::new(transport))),
        );
        let run = service.begin_run();

        let report = run.execute(&RuleTablePolicy).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].patient_id, 3);
        assert_eq!(report.failures[0].reminder_type, "overdue_screening");
        assert_eq!(report.sent.len(), 5);

        failing.store(false, Ordering::SeqCst);
        let retry = run.execute(&RuleTablePolicy).unwrap();
        assert_eq!(retry.sent.len(), 1);
        assert_eq!(retry.sent[0].patient_id, 3);
        assert_eq!(retry.duplicates.len(), 5);
        assert_eq!(run.records().len(), 6);
    }
}
