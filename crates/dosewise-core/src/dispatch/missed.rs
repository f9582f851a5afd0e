//! Missed-dose detection and alert fan-out.
//!
//! Selects obligations that exited the grace window still pending,
//! transitions them to `missed` through the state machine, and alerts the
//! user plus every alertable caregiver. Each recipient is a separate
//! receipted leg: a partial failure retries only the failed leg, never the
//! whole batch. The missed transition stands even when every alert fails.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::GraceConfig;
use crate::error::{EngineError, Result};
use crate::ledger::state::{self, Transition};
use crate::ledger::{DoseObligation, DoseStatus, ObligationMeta};
use crate::rewards::economy;
use crate::schedule;
use crate::storage::ledger_db::RECEIPT_MISSED;
use crate::storage::{DoseLedger, RewardStore};

use super::{CaregiverDirectory, MedicationCatalog, NotificationTransport, SweepReport};

pub struct MissedDoseDetector {
    ledger: Arc<DoseLedger>,
    catalog: Arc<dyn MedicationCatalog>,
    directory: Arc<dyn CaregiverDirectory>,
    transport: Arc<dyn NotificationTransport>,
    rewards: Arc<RewardStore>,
    config: GraceConfig,
}

impl MissedDoseDetector {
    pub fn new(
        ledger: Arc<DoseLedger>,
        catalog: Arc<dyn MedicationCatalog>,
        directory: Arc<dyn CaregiverDirectory>,
        transport: Arc<dyn NotificationTransport>,
        rewards: Arc<RewardStore>,
        config: GraceConfig,
    ) -> Self {
        Self {
            ledger,
            catalog,
            directory,
            transport,
            rewards,
            config,
        }
    }

    /// One sweep pass. Safely abortable mid-batch; receipts let the next
    /// run pick up stragglers.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let start = now - Duration::minutes(self.config.missed_cutoff_minutes);
        let end = now - Duration::minutes(self.config.missed_after_minutes);
        self.materialize_overdue(start, end, now)?;
        // Missed rows stay in scope so alert legs that failed to deliver
        // on an earlier pass get retried.
        let candidates = self.ledger.query_window(
            start,
            end,
            Some(&[DoseStatus::Pending, DoseStatus::Snoozed, DoseStatus::Missed]),
        )?;

        for obligation in candidates {
            let actionable = obligation.status == DoseStatus::Missed
                || (obligation.effectively_pending(now)
                    && state::missed_eligible(
                        obligation.key.scheduled_for,
                        now,
                        self.config.missed_after_minutes,
                        self.config.missed_cutoff_minutes,
                    ));
            if !actionable {
                continue;
            }
            report.examined += 1;
            if let Err(e) = self.handle_missed(&obligation, now, &mut report) {
                report.failed += 1;
                warn!(key = %obligation.key, error = %e, "missed sweep item failed");
            }
        }

        info!(%report, "missed-dose sweep done");
        Ok(report)
    }

    /// Materialize obligation rows for scheduled doses inside the sweep
    /// window that nobody has touched yet. A dose no reminder ever reached
    /// must still be detected as missed.
    fn materialize_overdue(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut dates = vec![start.date_naive()];
        if end.date_naive() != start.date_naive() {
            dates.push(end.date_naive());
        }
        for user_id in self.catalog.users()? {
            for sched in self.catalog.active_schedules(&user_id)? {
                for &date in &dates {
                    let Some(key) = schedule::expand_for_date(&sched, date)? else {
                        continue;
                    };
                    if key.scheduled_for <= start || key.scheduled_for > end {
                        continue;
                    }
                    let meta = ObligationMeta {
                        user_id: sched.user_id.clone(),
                        medication_id: sched.medication_id.clone(),
                        medication_name: sched.medication_name.clone(),
                        time_of_day: sched.time_of_day,
                    };
                    self.ledger.ensure_pending(&key, &meta, now)?;
                }
            }
        }
        Ok(())
    }

    fn handle_missed(
        &self,
        obligation: &DoseObligation,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let meta = ObligationMeta {
            user_id: obligation.user_id.clone(),
            medication_id: obligation.medication_id.clone(),
            medication_name: obligation.medication_name.clone(),
            time_of_day: obligation.time_of_day,
        };

        match self.ledger.upsert_status(
            &obligation.key,
            &meta,
            DoseStatus::Missed,
            None,
            None,
            now,
        ) {
            Ok((_, Transition::Apply)) => {
                self.settle_streak(&obligation.user_id, now)?;
            }
            Ok((_, Transition::Noop)) => {}
            // The user acted between the query and this write; not missed.
            Err(EngineError::Conflict { .. }) => {
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.alert_user(obligation, now, report)?;
        self.alert_caregivers(obligation, now, report)?;
        Ok(())
    }

    /// A missed dose breaks the streak unless an active shield absorbs it.
    fn settle_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut account = self.rewards.get_or_create_account(user_id, now)?;
        if economy::consume_shield(&mut account, now) {
            info!(user_id, "streak shield consumed by missed dose");
        } else {
            account.streak_days = 0;
            account.streak_multiplier = economy::MULTIPLIER_FLOOR;
        }
        account.updated_at = now;
        self.rewards.save_account(&account)
    }

    fn alert_user(
        &self,
        obligation: &DoseObligation,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        if !self
            .ledger
            .claim_receipt(RECEIPT_MISSED, &obligation.key, "user", now)?
        {
            report.skipped += 1;
            return Ok(());
        }
        let title = format!("Missed dose: {}", obligation.medication_name);
        let body = format!(
            "Your {} dose of {} was not recorded. You can still mark it.",
            obligation.time_of_day.as_str(),
            obligation.medication_name
        );
        let metadata = serde_json::json!({
            "kind": "missed_dose",
            "schedule_id": obligation.key.schedule_id,
            "scheduled_for": obligation.key.scheduled_for.to_rfc3339(),
        });

        let delivered = self
            .transport
            .send(&obligation.user_id, &title, &body, &metadata)
            .unwrap_or(false);
        if delivered {
            report.sent += 1;
        } else {
            self.ledger
                .release_receipt(RECEIPT_MISSED, &obligation.key, "user")?;
            report.failed += 1;
            warn!(key = %obligation.key, "missed-dose user alert failed, will retry");
        }
        Ok(())
    }

    fn alert_caregivers(
        &self,
        obligation: &DoseObligation,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        for contact in self.directory.alertable_caregivers(&obligation.user_id)? {
            let leg = format!("cg:{}", contact.caregiver_id);
            if !self
                .ledger
                .claim_receipt(RECEIPT_MISSED, &obligation.key, &leg, now)?
            {
                report.skipped += 1;
                continue;
            }
            let title = "Missed dose alert".to_string();
            let body = format!(
                "{} missed their {} dose of {}.",
                obligation.user_id,
                obligation.time_of_day.as_str(),
                obligation.medication_name
            );
            let metadata = serde_json::json!({
                "kind": "caregiver_missed_dose",
                "patient_id": obligation.user_id,
                "schedule_id": obligation.key.schedule_id,
                "scheduled_for": obligation.key.scheduled_for.to_rfc3339(),
            });

            let mut delivered = self
                .transport
                .send(&contact.caregiver_id, &title, &body, &metadata)
                .unwrap_or(false);
            // SMS fallback when the push did not land and a number exists.
            if !delivered {
                if let Some(phone) = &contact.phone {
                    delivered = self.transport.send_sms(phone, &body).unwrap_or(false);
                }
            }

            if delivered {
                report.sent += 1;
            } else {
                self.ledger
                    .release_receipt(RECEIPT_MISSED, &obligation.key, &leg)?;
                report.failed += 1;
                warn!(
                    key = %obligation.key,
                    caregiver = %contact.caregiver_id,
                    "caregiver alert failed, will retry"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingTransport;
    use crate::schedule::{DoseKey, TimeOfDay};
    use chrono::TimeZone;

    fn meta() -> ObligationMeta {
        ObligationMeta {
            user_id: "user-1".to_string(),
            medication_id: "med-1".to_string(),
            medication_name: "Metformin".to_string(),
            time_of_day: TimeOfDay::Morning,
        }
    }

    fn key_at(h: u32, m: u32) -> DoseKey {
        DoseKey {
            schedule_id: "sched-1".to_string(),
            scheduled_for: Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap(),
        }
    }

    struct Fixture {
        ledger: Arc<DoseLedger>,
        rewards: Arc<RewardStore>,
        transport: Arc<RecordingTransport>,
        detector: MissedDoseDetector,
    }

    fn setup() -> Fixture {
        let ledger = Arc::new(DoseLedger::open_memory().unwrap());
        let rewards = Arc::new(RewardStore::open_memory().unwrap());
        let transport = Arc::new(RecordingTransport::default());
        let detector = MissedDoseDetector::new(
            Arc::clone(&ledger),
            Arc::clone(&ledger) as Arc<dyn MedicationCatalog>,
            Arc::clone(&ledger) as Arc<dyn CaregiverDirectory>,
            Arc::clone(&transport) as Arc<dyn NotificationTransport>,
            Arc::clone(&rewards),
            GraceConfig::default(),
        );
        Fixture {
            ledger,
            rewards,
            transport,
            detector,
        }
    }

    #[test]
    fn pending_dose_past_grace_becomes_missed_and_alerts() {
        let f = setup();
        let key = key_at(8, 0);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 31, 0).unwrap();
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();
        f.ledger
            .add_caregiver("user-1", "cg-1", None, true)
            .unwrap();
        f.ledger
            .add_caregiver("user-1", "cg-2", None, true)
            .unwrap();

        let report = f.detector.run_sweep(now).unwrap();
        assert_eq!(report.examined, 1);
        // One user alert plus two caregiver alerts.
        assert_eq!(report.sent, 3);
        assert_eq!(f.transport.sent_to("user-1"), 1);
        assert_eq!(f.transport.sent_to("cg-1"), 1);
        assert_eq!(f.transport.sent_to("cg-2"), 1);

        let obligation = f.ledger.get(&key).unwrap().unwrap();
        assert_eq!(obligation.status, DoseStatus::Missed);
    }

    #[test]
    fn inside_grace_window_is_left_alone() {
        let f = setup();
        let key = key_at(8, 0);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 29, 0).unwrap();
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();

        let report = f.detector.run_sweep(now).unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(f.ledger.get(&key).unwrap().unwrap().status, DoseStatus::Pending);
    }

    #[test]
    fn repeated_sweeps_do_not_duplicate_alerts() {
        let f = setup();
        let key = key_at(8, 0);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();
        f.ledger
            .add_caregiver("user-1", "cg-1", None, true)
            .unwrap();

        let first = f.detector.run_sweep(now).unwrap();
        let second = f.detector.run_sweep(now + Duration::minutes(5)).unwrap();
        assert_eq!(first.sent, 2);
        assert_eq!(second.sent, 0);
        assert_eq!(f.transport.sent_to("user-1"), 1);
        assert_eq!(f.transport.sent_to("cg-1"), 1);
    }

    #[test]
    fn partial_failure_retries_only_the_failed_leg() {
        let f = setup();
        let key = key_at(8, 0);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();
        f.ledger
            .add_caregiver("user-1", "cg-1", None, true)
            .unwrap();
        f.ledger
            .add_caregiver("user-1", "cg-2", None, true)
            .unwrap();

        // cg-1's push fails with no SMS fallback registered.
        f.transport
            .fail_push_for
            .lock()
            .unwrap()
            .push("cg-1".to_string());
        let first = f.detector.run_sweep(now).unwrap();
        assert_eq!(first.sent, 2); // user + cg-2
        assert_eq!(first.failed, 1);

        f.transport.fail_push_for.lock().unwrap().clear();
        let second = f.detector.run_sweep(now + Duration::minutes(5)).unwrap();
        assert_eq!(second.sent, 1); // only cg-1 retried
        assert_eq!(f.transport.sent_to("user-1"), 1);
        assert_eq!(f.transport.sent_to("cg-2"), 1);
        assert_eq!(f.transport.sent_to("cg-1"), 1);
    }

    #[test]
    fn sms_fallback_covers_failed_push() {
        let f = setup();
        let key = key_at(8, 0);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();
        f.ledger
            .add_caregiver("user-1", "cg-1", Some("+15550100"), true)
            .unwrap();
        f.transport
            .fail_push_for
            .lock()
            .unwrap()
            .push("cg-1".to_string());

        let report = f.detector.run_sweep(now).unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(f.transport.sms.lock().unwrap().len(), 1);
        assert_eq!(f.transport.sms.lock().unwrap()[0].0, "+15550100");
    }

    #[test]
    fn missed_dose_resets_streak_without_shield() {
        let f = setup();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        let mut account = f.rewards.get_or_create_account("user-1", now).unwrap();
        account.streak_days = 12;
        account.streak_multiplier = 2.2;
        f.rewards.save_account(&account).unwrap();

        let key = key_at(8, 0);
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();
        f.detector.run_sweep(now).unwrap();

        let account = f.rewards.get_or_create_account("user-1", now).unwrap();
        assert_eq!(account.streak_days, 0);
        assert_eq!(account.streak_multiplier, economy::MULTIPLIER_FLOOR);
    }

    #[test]
    fn shield_absorbs_missed_dose() {
        let f = setup();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        let mut account = f.rewards.get_or_create_account("user-1", now).unwrap();
        account.streak_days = 12;
        account.shield_expires_at = Some(now + Duration::hours(10));
        f.rewards.save_account(&account).unwrap();

        let key = key_at(8, 0);
        f.ledger.ensure_pending(&key, &meta(), now).unwrap();
        f.detector.run_sweep(now).unwrap();

        let account = f.rewards.get_or_create_account("user-1", now).unwrap();
        assert_eq!(account.streak_days, 12);
        assert!(account.shield_expires_at.is_none(), "shield consumed");
    }

    #[test]
    fn unmaterialized_overdue_dose_is_detected() {
        let f = setup();
        // Registered schedule, but no reminder ever materialized a row.
        f.ledger
            .upsert_schedule(&crate::schedule::ScheduleDefinition {
                id: "sched-1".to_string(),
                user_id: "user-1".to_string(),
                medication_id: "med-1".to_string(),
                medication_name: "Metformin".to_string(),
                clock_time: "08:00".to_string(),
                time_of_day: TimeOfDay::Morning,
                weekdays: Vec::new(),
                active: true,
            })
            .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let report = f.detector.run_sweep(now).unwrap();
        assert_eq!(report.examined, 1);
        let obligation = f.ledger.get(&key_at(8, 0)).unwrap().unwrap();
        assert_eq!(obligation.status, DoseStatus::Missed);
        assert_eq!(f.transport.sent_to("user-1"), 1);
    }

    #[test]
    fn snoozed_past_resume_is_swept() {
        let f = setup();
        let key = key_at(8, 0);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        f.ledger
            .upsert_status(
                &key,
                &meta(),
                DoseStatus::Snoozed,
                Some(key.scheduled_for),
                Some(key.scheduled_for + Duration::minutes(10)),
                now,
            )
            .unwrap();

        let report = f.detector.run_sweep(now).unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(f.ledger.get(&key).unwrap().unwrap().status, DoseStatus::Missed);
    }
}
