//! Reminder dispatch.
//!
//! The dispatcher delivers reminders through a [`ReminderTransport`] and keeps a
//! per-run log of successful deliveries. A patient receives at most one reminder
//! per run: a second attempt is rejected with
//! [`OutreachError::DuplicateDispatch`]. A failed delivery is not logged, so the
//! patient can be retried within the same run.
//!
//! The log is keyed by [`RunId`] and the check-and-record sequence runs under a
//! single lock guard, so concurrent runs sharing a dispatcher cannot both deliver
//! to the same patient in the same run. A run only gets a log entry once a
//! reminder is delivered in it.

use crate::error::{OutreachError, OutreachResult};
use chrono::{DateTime, Utc};
use outreach_types::RunId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Reminder urgency. Ordered from least to most urgent.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(OutreachError::InvalidInput(format!(
                "unknown priority '{other}' (expected low, normal, high or urgent)"
            ))),
        }
    }
}

/// A successfully delivered reminder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReminderRecord {
    pub run_id: RunId,
    pub patient_id: i64,
    pub reminder_type: String,
    pub priority: Priority,
    pub sent_at: DateTime<Utc>,
}

/// Everything a transport needs to deliver one reminder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingReminder {
    pub run_id: RunId,
    pub patient_id: i64,
    pub patient_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub reminder_type: String,
    pub priority: Priority,
    /// Rendered message, when the reminder type has a template in the catalog.
    pub message: Option<String>,
}

/// Delivery failure reported by a transport.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Delivery seam for reminders.
pub trait ReminderTransport: Send + Sync {
    fn deliver(&self, reminder: &OutgoingReminder) -> Result<(), TransportError>;
}

/// Transport that records each delivery as a tracing event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

impl ReminderTransport for LogTransport {
    fn deliver(&self, reminder: &OutgoingReminder) -> Result<(), TransportError> {
        tracing::info!(
            run_id = %reminder.run_id,
            patient_id = reminder.patient_id,
            reminder_type = %reminder.reminder_type,
            priority = %reminder.priority,
            "reminder sent to {}: {}",
            reminder.patient_name,
            reminder.message.as_deref().unwrap_or(&reminder.reminder_type)
        );
        Ok(())
    }
}

/// Sends reminders and remembers who already received one in each run.
pub struct ReminderDispatcher {
    transport: Box<dyn ReminderTransport>,
    log: Mutex<HashMap<RunId, Vec<ReminderRecord>>>,
}

impl fmt::Debug for ReminderDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReminderDispatcher").finish_non_exhaustive()
    }
}

impl Default for ReminderDispatcher {
    fn default() -> Self {
        Self::new(Box::new(LogTransport))
    }
}

impl ReminderDispatcher {
    pub fn new(transport: Box<dyn ReminderTransport>) -> Self {
        Self {
            transport,
            log: Mutex::new(HashMap::new()),
        }
    }

    /// Delivers a reminder unless the patient already received one in this run.
    ///
    /// # Errors
    ///
    /// - [`OutreachError::DuplicateDispatch`] if a reminder was already delivered
    ///   to the patient in `reminder.run_id`.
    /// - [`OutreachError::DispatchFailure`] if the transport fails. Nothing is
    ///   logged and a retry remains allowed.
    pub fn fire(&self, reminder: OutgoingReminder) -> OutreachResult<ReminderRecord> {
        let mut log = self.lock_log();

        let already_sent = log
            .get(&reminder.run_id)
            .is_some_and(|sent| sent.iter().any(|r| r.patient_id == reminder.patient_id));
        if already_sent {
            tracing::warn!(
                "rejected duplicate reminder '{}' for patient {} in run {}",
                reminder.reminder_type,
                reminder.patient_id,
                reminder.run_id
            );
            return Err(OutreachError::DuplicateDispatch {
                run_id: reminder.run_id,
                patient_id: reminder.patient_id,
            });
        }

        // The guard is held across delivery: the slot stays reserved until the
        // transport reports success or failure.
        if let Err(e) = self.transport.deliver(&reminder) {
            tracing::warn!(
                "failed to deliver reminder to patient {}: {}",
                reminder.patient_id,
                e
            );
            return Err(OutreachError::DispatchFailure {
                patient_id: reminder.patient_id,
                reason: e.to_string(),
            });
        }

        let record = ReminderRecord {
            run_id: reminder.run_id,
            patient_id: reminder.patient_id,
            reminder_type: reminder.reminder_type,
            priority: reminder.priority,
            sent_at: Utc::now(),
        };
        log.entry(record.run_id).or_default().push(record.clone());
        Ok(record)
    }

    /// Delivered reminders for a run, in send order.
    pub fn records(&self, run_id: RunId) -> Vec<ReminderRecord> {
        self.lock_log().get(&run_id).cloned().unwrap_or_default()
    }

    pub fn sent_count(&self, run_id: RunId, patient_id: i64) -> usize {
        self.lock_log()
            .get(&run_id)
            .map_or(0, |sent| sent.iter().filter(|r| r.patient_id == patient_id).count())
    }

    /// Entries are only added after a successful delivery, so a guard poisoned
    /// by a panicking transport still holds a consistent log.
    fn lock_log(&self) -> MutexGuard<'_, HashMap<RunId, Vec<ReminderRecord>>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reminder(run_id: RunId, patient_id: i64, reminder_type: &str) -> OutgoingReminder {
        OutgoingReminder {
            run_id,
            patient_id,
            patient_name: "Test Patient".into(),
            phone: None,
            email: None,
            reminder_type: reminder_type.into(),
            priority: Priority::Normal,
            message: None,
        }
    }

    /// Fails the first `failures` deliveries, then succeeds. Counts successes.
    struct FlakyTransport {
        failures: AtomicUsize,
        delivered: Arc<AtomicUsize>,
    }

    impl ReminderTransport for FlakyTransport {
        fn deliver(&self, _reminder: &OutgoingReminder) -> Result<(), TransportError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError("gateway unavailable".into()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn flaky(failures: usize) -> (ReminderDispatcher, Arc<AtomicUsize>) {
        let delivered = Arc::new(AtomicUsize::new(0));
        let transport = FlakyTransport {
            failures: AtomicUsize::new(failures),
            delivered: delivered.clone(),
        };
        (ReminderDispatcher::new(Box::new(transport)), delivered)
    }

    #[test]
    fn second_dispatch_same_run_is_duplicate() {
        let (dispatcher, delivered) = flaky(0);
        let run = RunId::new();

        let record = dispatcher.fire(reminder(run, 5, "hba1c_testing")).unwrap();
        assert_eq!(record.patient_id, 5);
        assert_eq!(record.priority, Priority::Normal);

        let err = dispatcher
            .fire(reminder(run, 5, "hba1c_testing"))
            .unwrap_err();
        assert!(matches!(
            err,
            OutreachError::DuplicateDispatch { patient_id: 5, .. }
        ));

        assert_eq!(dispatcher.sent_count(run, 5), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_check_ignores_reminder_type() {
        let (dispatcher, _) = flaky(0);
        let run = RunId::new();
        dispatcher.fire(reminder(run, 1, "hba1c_testing")).unwrap();
        assert!(dispatcher
            .fire(reminder(run, 1, "weight_management"))
            .is_err());
        assert_eq!(dispatcher.records(run).len(), 1);
    }

    #[test]
    fn runs_are_isolated() {
        let (dispatcher, delivered) = flaky(0);
        let first = RunId::new();
        let second = RunId::new();

        dispatcher.fire(reminder(first, 5, "hba1c_testing")).unwrap();
        dispatcher.fire(reminder(second, 5, "hba1c_testing")).unwrap();

        assert_eq!(dispatcher.sent_count(first, 5), 1);
        assert_eq!(dispatcher.sent_count(second, 5), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_delivery_does_not_consume_slot() {
        let (dispatcher, delivered) = flaky(1);
        let run = RunId::new();

        let err = dispatcher.fire(reminder(run, 3, "overdue_screening")).unwrap_err();
        match err {
            OutreachError::DispatchFailure { patient_id, reason } => {
                assert_eq!(patient_id, 3);
                assert!(reason.contains("gateway"));
            }
            other => panic!("expected DispatchFailure, got {other:?}"),
        }
        assert_eq!(dispatcher.sent_count(run, 3), 0);

        dispatcher.fire(reminder(run, 3, "overdue_screening")).unwrap();
        assert_eq!(dispatcher.sent_count(run, 3), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_dispatches_deliver_once() {
        let (dispatcher, delivered) = flaky(0);
        let dispatcher = Arc::new(dispatcher);
        let run = RunId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || dispatcher.fire(reminder(run, 9, "routine_followup")))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(successes, 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.sent_count(run, 9), 1);
    }

    #[test]
    fn records_for_unknown_run_are_empty() {
        let dispatcher = ReminderDispatcher::default();
        assert!(dispatcher.records(RunId::new()).is_empty());
        assert!(dispatcher.log.lock().unwrap().is_empty());
    }

    #[test]
    fn only_delivered_reminders_create_run_entries() {
        let (dispatcher, _) = flaky(1);
        let failed_run = RunId::new();
        assert!(dispatcher
            .fire(reminder(failed_run, 3, "overdue_screening"))
            .is_err());
        assert_eq!(dispatcher.sent_count(failed_run, 3), 0);
        assert!(dispatcher.log.lock().unwrap().is_empty());

        let run = RunId::new();
        dispatcher.fire(reminder(run, 3, "overdue_screening")).unwrap();
        assert!(dispatcher.fire(reminder(run, 3, "overdue_screening")).is_err());
        let log = dispatcher.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log.contains_key(&run));
    }

    /// Panics when delivering to one patient.
    struct PanickingTransport {
        patient_id: i64,
    }

    impl ReminderTransport for PanickingTransport {
        fn deliver(&self, reminder: &OutgoingReminder) -> Result<(), TransportError> {
            if reminder.patient_id == self.patient_id {
                panic!("transport crashed");
            }
            Ok(())
        }
    }

    #[test]
    fn panicking_transport_does_not_block_later_dispatches() {
        let dispatcher = ReminderDispatcher::new(Box::new(PanickingTransport { patient_id: 1 }));
        let first = RunId::new();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            dispatcher.fire(reminder(first, 1, "hba1c_testing"))
        }));
        assert!(outcome.is_err());
        assert!(dispatcher.log.is_poisoned());

        let second = RunId::new();
        let record = dispatcher.fire(reminder(second, 2, "hba1c_testing")).unwrap();
        assert_eq!(record.patient_id, 2);
        assert_eq!(dispatcher.records(second).len(), 1);
        assert_eq!(dispatcher.sent_count(first, 1), 0);
    }

    #[test]
    fn priority_parses_and_orders() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("critical".parse::<Priority>().is_err());
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::Urgent > Priority::High && Priority::Normal > Priority::Low);
        assert_eq!(
            serde_json::to_string(&Priority::Urgent).unwrap(),
            "\"urgent\""
        );
    }
}
