//! Weekly, resettable challenges.
//!
//! Each ISO week (Monday start) every active challenge definition gets one
//! progress row per user, created lazily and idempotently. Qualifying dose
//! events advance every matching not-yet-completed row; completion flips
//! once and the reward is claimable exactly once.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RewardError};
use crate::ledger::Timeliness;
use crate::rewards::DOUBLE_COINS_ITEM;
use crate::schedule::TimeOfDay;
use crate::storage::reward_db::ChallengeRow;
use crate::storage::RewardStore;

/// Predicate a dose event must satisfy to advance a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePredicate {
    /// Restrict to one time-of-day bucket, or any when `None`.
    pub time_of_day: Option<TimeOfDay>,
    /// Require the early window, not just on-time.
    pub require_early: bool,
}

/// A read-only weekly challenge definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    pub id: String,
    pub name: String,
    pub target: i64,
    pub predicate: ChallengePredicate,
    pub reward_coins: i64,
    pub reward_spins: i64,
}

/// Built-in weekly challenges.
pub fn default_challenges() -> Vec<ChallengeDefinition> {
    vec![
        ChallengeDefinition {
            id: "seven_on_time".to_string(),
            name: "Clockwork: take 7 doses on time".to_string(),
            target: 7,
            predicate: ChallengePredicate {
                time_of_day: None,
                require_early: false,
            },
            reward_coins: 100,
            reward_spins: 2,
        },
        ChallengeDefinition {
            id: "morning_five".to_string(),
            name: "Early riser: take 5 morning doses on time".to_string(),
            target: 5,
            predicate: ChallengePredicate {
                time_of_day: Some(TimeOfDay::Morning),
                require_early: false,
            },
            reward_coins: 75,
            reward_spins: 1,
        },
        ChallengeDefinition {
            id: "early_three".to_string(),
            name: "Sharp shooter: take 3 doses within 5 minutes".to_string(),
            target: 3,
            predicate: ChallengePredicate {
                time_of_day: None,
                require_early: true,
            },
            reward_coins: 50,
            reward_spins: 1,
        },
    ]
}

/// A qualifying dose event as seen by the tracker.
#[derive(Debug, Clone, Copy)]
pub struct DoseEvent {
    pub time_of_day: TimeOfDay,
    pub timeliness: Timeliness,
    /// Whether the dose had been snoozed before being taken.
    pub was_snoozed: bool,
}

/// Coins and spins credited by a successful claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub coins_awarded: i64,
    pub spins_awarded: i64,
}

/// Re-export the stored progress row under its domain name.
pub type ChallengeProgress = ChallengeRow;

/// Tracks weekly challenge progress against the reward store.
pub struct ChallengeTracker {
    store: Arc<RewardStore>,
    definitions: Vec<ChallengeDefinition>,
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

impl ChallengeTracker {
    pub fn new(store: Arc<RewardStore>) -> Self {
        Self {
            store,
            definitions: default_challenges(),
        }
    }

    pub fn with_definitions(store: Arc<RewardStore>, definitions: Vec<ChallengeDefinition>) -> Self {
        Self { store, definitions }
    }

    pub fn definitions(&self) -> &[ChallengeDefinition] {
        &self.definitions
    }

    pub fn definition(&self, id: &str) -> Option<&ChallengeDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Materialize this week's progress rows for a user. Idempotent under
    /// overlap and re-invocation; unique-constraint conflicts are ignored.
    pub fn ensure_week(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let week = week_start(now.date_naive());
        for def in &self.definitions {
            self.store.ensure_challenge_row(user_id, &def.id, week)?;
        }
        Ok(())
    }

    /// Advance every matching, not-yet-completed challenge for a taken dose.
    /// Snoozed and late doses never qualify.
    pub fn record_dose(&self, user_id: &str, event: DoseEvent, now: DateTime<Utc>) -> Result<()> {
        if event.was_snoozed || !event.timeliness.is_on_time() {
            return Ok(());
        }
        self.ensure_week(user_id, now)?;
        let week = week_start(now.date_naive());
        for def in &self.definitions {
            if !Self::matches(&def.predicate, event) {
                continue;
            }
            if let Some(row) = self
                .store
                .increment_challenge(user_id, &def.id, week, def.target, now)?
            {
                if row.completed && row.progress == def.target {
                    debug!(user_id, challenge = %def.id, "challenge completed");
                }
            }
        }
        Ok(())
    }

    fn matches(predicate: &ChallengePredicate, event: DoseEvent) -> bool {
        if let Some(bucket) = predicate.time_of_day {
            if bucket != event.time_of_day {
                return false;
            }
        }
        if predicate.require_early && event.timeliness != Timeliness::Early {
            return false;
        }
        true
    }

    /// This week's progress rows for a user.
    pub fn week_progress(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<ChallengeProgress>> {
        self.ensure_week(user_id, now)?;
        self.store
            .challenge_rows(user_id, week_start(now.date_naive()))
    }

    /// Claim the reward for a completed challenge row and credit it to the
    /// user's account. The flag flip and the credit commit in one store
    /// transaction: a claim either pays out or leaves the row claimable.
    /// Challenge rewards are fixed amounts; only an active double-coins
    /// boost scales the coin half.
    pub fn claim(
        &self,
        progress_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(ChallengeProgress, ClaimOutcome)> {
        let row = self
            .store
            .challenge_row_by_id(progress_id)?
            .ok_or_else(|| RewardError::UnknownChallenge(progress_id.to_string()))?;
        let mut outcome = self
            .definition(&row.challenge_id)
            .map(|def| ClaimOutcome {
                coins_awarded: def.reward_coins,
                spins_awarded: def.reward_spins,
            })
            .unwrap_or(ClaimOutcome {
                coins_awarded: 0,
                spins_awarded: 0,
            });
        if self.store.has_active_item(&row.user_id, DOUBLE_COINS_ITEM, now)? {
            outcome.coins_awarded *= 2;
        }
        let mut account = self.store.get_or_create_account(&row.user_id, now)?;
        account.coins += outcome.coins_awarded;
        account.available_spins += outcome.spins_awarded;
        account.updated_at = now;
        let row = self.store.claim_challenge(progress_id, &account)?;
        Ok((row, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, RewardError};
    use chrono::TimeZone;

    fn tracker() -> ChallengeTracker {
        ChallengeTracker::new(Arc::new(RewardStore::open_memory().unwrap()))
    }

    fn on_time(bucket: TimeOfDay) -> DoseEvent {
        DoseEvent {
            time_of_day: bucket,
            timeliness: Timeliness::OnTime,
            was_snoozed: false,
        }
    }

    #[test]
    fn week_start_is_iso_monday() {
        // 2026-03-05 is a Thursday.
        let thursday = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        // Monday maps to itself.
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(week_start(monday), monday);
        // Sunday belongs to the preceding Monday's week.
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        assert_eq!(week_start(sunday), monday);
    }

    #[test]
    fn rollover_is_idempotent() {
        let tracker = tracker();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
        tracker.ensure_week("user-1", now).unwrap();
        tracker.ensure_week("user-1", now).unwrap();
        let rows = tracker.week_progress("user-1", now).unwrap();
        assert_eq!(rows.len(), default_challenges().len());
    }

    #[test]
    fn snoozed_and_late_doses_do_not_qualify() {
        let tracker = tracker();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();

        tracker
            .record_dose(
                "user-1",
                DoseEvent {
                    time_of_day: TimeOfDay::Morning,
                    timeliness: Timeliness::Late,
                    was_snoozed: false,
                },
                now,
            )
            .unwrap();
        tracker
            .record_dose(
                "user-1",
                DoseEvent {
                    time_of_day: TimeOfDay::Morning,
                    timeliness: Timeliness::OnTime,
                    was_snoozed: true,
                },
                now,
            )
            .unwrap();

        for row in tracker.week_progress("user-1", now).unwrap() {
            assert_eq!(row.progress, 0);
        }
    }

    #[test]
    fn bucket_predicate_filters_events() {
        let tracker = tracker();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 21, 0, 0).unwrap();
        tracker
            .record_dose("user-1", on_time(TimeOfDay::Evening), now)
            .unwrap();

        let rows = tracker.week_progress("user-1", now).unwrap();
        let by_id = |id: &str| rows.iter().find(|r| r.challenge_id == id).unwrap();
        assert_eq!(by_id("seven_on_time").progress, 1);
        assert_eq!(by_id("morning_five").progress, 0);
        assert_eq!(by_id("early_three").progress, 0);
    }

    #[test]
    fn completion_flips_once_and_claim_is_exclusive() {
        let tracker = tracker();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap();
        let early = DoseEvent {
            time_of_day: TimeOfDay::Morning,
            timeliness: Timeliness::Early,
            was_snoozed: false,
        };
        for _ in 0..5 {
            tracker.record_dose("user-1", early, now).unwrap();
        }

        let rows = tracker.week_progress("user-1", now).unwrap();
        let row = rows.iter().find(|r| r.challenge_id == "early_three").unwrap();
        assert!(row.completed);
        assert_eq!(row.progress, 3, "progress stops advancing at completion");

        let (_, outcome) = tracker.claim(&row.id, now).unwrap();
        assert_eq!(outcome.coins_awarded, 50);
        assert_eq!(outcome.spins_awarded, 1);

        let err = tracker.claim(&row.id, now).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Reward(RewardError::AlreadyClaimed)
        ));
    }
}
