//! Pre-dose reminder sweep.
//!
//! Runs on a fixed interval from any external scheduler. For each active
//! schedule, checks whether `now` falls inside the configured lead window
//! before today's dose and sends at most one reminder per obligation per
//! day. The dispatch receipt is claimed before sending and released on a
//! failed send, so overlapping sweeps cannot both deliver and failed
//! deliveries are retried by the next run.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::ReminderConfig;
use crate::error::Result;
use crate::ledger::ObligationMeta;
use crate::schedule::{self, ScheduleDefinition};
use crate::storage::ledger_db::RECEIPT_REMINDER;
use crate::storage::DoseLedger;

use super::{MedicationCatalog, NotificationTransport, SweepReport};

pub struct ReminderDispatcher {
    ledger: Arc<DoseLedger>,
    catalog: Arc<dyn MedicationCatalog>,
    transport: Arc<dyn NotificationTransport>,
    config: ReminderConfig,
}

impl ReminderDispatcher {
    pub fn new(
        ledger: Arc<DoseLedger>,
        catalog: Arc<dyn MedicationCatalog>,
        transport: Arc<dyn NotificationTransport>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            ledger,
            catalog,
            transport,
            config,
        }
    }

    /// One sweep pass. Idempotent under overlap and re-invocation.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for user_id in self.catalog.users()? {
            for sched in self.catalog.active_schedules(&user_id)? {
                if let Err(e) = self.sweep_schedule(&sched, now, &mut report) {
                    report.failed += 1;
                    warn!(schedule = %sched.id, error = %e, "reminder sweep item failed");
                }
            }
        }
        info!(%report, "reminder sweep done");
        Ok(report)
    }

    fn sweep_schedule(
        &self,
        sched: &ScheduleDefinition,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let Some(key) = schedule::expand_for_date(sched, now.date_naive())? else {
            return Ok(());
        };

        let lead = key.scheduled_for - now;
        if lead < Duration::minutes(self.config.lead_min_minutes)
            || lead > Duration::minutes(self.config.lead_max_minutes)
        {
            return Ok(());
        }
        report.examined += 1;

        // Already acted on (taken early, skipped): nothing to remind.
        if let Some(obligation) = self.ledger.get(&key)? {
            if !obligation.effectively_pending(now) {
                report.skipped += 1;
                return Ok(());
            }
        }

        if !self.ledger.claim_receipt(RECEIPT_REMINDER, &key, "", now)? {
            report.skipped += 1;
            return Ok(());
        }

        let title = format!("Time for {}", sched.medication_name);
        let body = format!(
            "Your {} dose of {} is coming up at {}.",
            sched.time_of_day.as_str(),
            sched.medication_name,
            sched.clock_time
        );
        let metadata = serde_json::json!({
            "kind": "dose_reminder",
            "schedule_id": key.schedule_id,
            "scheduled_for": key.scheduled_for.to_rfc3339(),
        });

        let delivered = self
            .transport
            .send(&sched.user_id, &title, &body, &metadata)
            .unwrap_or(false);

        if delivered {
            let meta = ObligationMeta {
                user_id: sched.user_id.clone(),
                medication_id: sched.medication_id.clone(),
                medication_name: sched.medication_name.clone(),
                time_of_day: sched.time_of_day,
            };
            self.ledger.ensure_pending(&key, &meta, now)?;
            report.sent += 1;
        } else {
            // Release so the next sweep retries this obligation.
            self.ledger.release_receipt(RECEIPT_REMINDER, &key, "")?;
            report.failed += 1;
            warn!(key = %key, "reminder delivery failed, will retry");
        }
        Ok(())
    }
}
