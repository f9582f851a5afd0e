//! Notification dispatch: collaborator traits and the periodic sweeps.
//!
//! The engine talks to the outside world through three narrow traits --
//! medication catalog, caregiver directory, notification transport -- so
//! sweeps are testable with recording fakes and deployable against any
//! real transport.

pub mod missed;
pub mod reminder;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::ScheduleDefinition;
use crate::storage::DoseLedger;

pub use missed::MissedDoseDetector;
pub use reminder::ReminderDispatcher;

/// Source of schedule definitions (medication management owns the data).
pub trait MedicationCatalog: Send + Sync {
    /// Users with at least one schedule, for sweeps and weekly rollover.
    fn users(&self) -> Result<Vec<String>>;
    fn active_schedules(&self, user_id: &str) -> Result<Vec<ScheduleDefinition>>;
    fn schedule_by_id(&self, schedule_id: &str) -> Result<Option<ScheduleDefinition>>;
}

/// A caregiver who opted in to missed-dose alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverContact {
    pub caregiver_id: String,
    /// SMS fallback number, if registered.
    pub phone: Option<String>,
}

/// Caregiver relationships for a patient.
pub trait CaregiverDirectory: Send + Sync {
    fn alertable_caregivers(&self, patient_id: &str) -> Result<Vec<CaregiverContact>>;
}

/// Push/SMS delivery. Implementations return whether the message was
/// delivered; delivery failure is never an engine error.
pub trait NotificationTransport: Send + Sync {
    fn send(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool>;

    fn send_sms(&self, phone: &str, body: &str) -> Result<bool>;
}

/// Summary of one sweep run. Sweeps accumulate per-item failures instead
/// of aborting; stragglers are picked up by the next run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Items that fell inside the sweep's window.
    pub examined: u64,
    /// Notifications delivered this run.
    pub sent: u64,
    /// Send attempts that failed and will be retried.
    pub failed: u64,
    /// Items already handled (receipt held, or obligation already acted on).
    pub skipped: u64,
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "examined={} sent={} failed={} skipped={}",
            self.examined, self.sent, self.failed, self.skipped
        )
    }
}

impl MedicationCatalog for DoseLedger {
    fn users(&self) -> Result<Vec<String>> {
        DoseLedger::users(self)
    }

    fn active_schedules(&self, user_id: &str) -> Result<Vec<ScheduleDefinition>> {
        DoseLedger::active_schedules(self, user_id)
    }

    fn schedule_by_id(&self, schedule_id: &str) -> Result<Option<ScheduleDefinition>> {
        DoseLedger::schedule_by_id(self, schedule_id)
    }
}

impl CaregiverDirectory for DoseLedger {
    fn alertable_caregivers(&self, patient_id: &str) -> Result<Vec<CaregiverContact>> {
        Ok(DoseLedger::alertable_caregivers(self, patient_id)?
            .into_iter()
            .map(|(caregiver_id, phone)| CaregiverContact {
                caregiver_id,
                phone,
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fakes shared by the dispatch tests.

    use std::sync::Mutex;

    use super::*;

    /// Transport that records every send and can be told to fail.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(String, String)>>,
        pub sms: Mutex<Vec<(String, String)>>,
        /// Recipients whose pushes should report non-delivery.
        pub fail_push_for: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        pub fn sent_to(&self, user_id: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _)| to == user_id)
                .count()
        }
    }

    impl NotificationTransport for RecordingTransport {
        fn send(
            &self,
            user_id: &str,
            title: &str,
            _body: &str,
            _metadata: &serde_json::Value,
        ) -> Result<bool> {
            if self
                .fail_push_for
                .lock()
                .unwrap()
                .iter()
                .any(|u| u == user_id)
            {
                return Ok(false);
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), title.to_string()));
            Ok(true)
        }

        fn send_sms(&self, phone: &str, body: &str) -> Result<bool> {
            self.sms
                .lock()
                .unwrap()
                .push((phone.to_string(), body.to_string()));
            Ok(true)
        }
    }
}
