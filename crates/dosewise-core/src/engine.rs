//! Engine facade tying the ledger, dispatchers, and reward pipeline
//! together behind one API.
//!
//! `AdherenceEngine` owns the wiring: the same `DoseLedger` serves as
//! catalog, caregiver directory, and obligation store, and every dose
//! action flows through the state machine before any reward side effect
//! runs. Reward bookkeeping only fires on an applied `taken` transition,
//! so replays and conflicting writes can never double-credit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::dispatch::{
    MedicationCatalog, MissedDoseDetector, NotificationTransport, ReminderDispatcher, SweepReport,
};
use crate::error::{Result, ValidationError};
use crate::ledger::state::{DoseAction, Timeliness, Transition};
use crate::ledger::{DoseObligation, DoseStatus, ObligationMeta};
use crate::rewards::badges::BadgeType;
use crate::rewards::challenges::{
    self, ChallengeProgress, ChallengeTracker, ClaimOutcome, DoseEvent,
};
use crate::rewards::slot::SpinResult;
use crate::rewards::{economy, RewardAccount, RewardEngine, DOUBLE_COINS_ITEM};
use crate::schedule::{self, DoseKey};
use crate::storage::{DoseLedger, RewardStore};

/// What a dose action produced, for callers that render feedback.
#[derive(Debug, Clone, Serialize)]
pub struct DoseActionOutcome {
    pub obligation: DoseObligation,
    /// False when the action was an idempotent replay.
    pub applied: bool,
    pub timeliness: Option<Timeliness>,
    pub coins_awarded: i64,
    pub spins_awarded: i64,
    pub streak_days: i64,
    pub milestone: Option<i64>,
    pub new_badges: Vec<BadgeType>,
}

pub struct AdherenceEngine {
    ledger: Arc<DoseLedger>,
    rewards: Arc<RewardEngine>,
    challenges: ChallengeTracker,
    reminders: ReminderDispatcher,
    missed: MissedDoseDetector,
    config: EngineConfig,
}

impl AdherenceEngine {
    pub fn new(
        ledger: Arc<DoseLedger>,
        store: Arc<RewardStore>,
        transport: Arc<dyn NotificationTransport>,
        config: EngineConfig,
    ) -> Self {
        let rewards = Arc::new(RewardEngine::new(
            Arc::clone(&store),
            config.rewards.clone(),
        ));
        let reminders = ReminderDispatcher::new(
            Arc::clone(&ledger),
            Arc::clone(&ledger) as Arc<dyn MedicationCatalog>,
            Arc::clone(&transport),
            config.reminder.clone(),
        );
        let missed = MissedDoseDetector::new(
            Arc::clone(&ledger),
            Arc::clone(&ledger) as _,
            Arc::clone(&ledger) as _,
            transport,
            Arc::clone(&store),
            config.grace.clone(),
        );
        Self {
            ledger,
            rewards,
            challenges: ChallengeTracker::new(store),
            reminders,
            missed,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<DoseLedger> {
        &self.ledger
    }

    pub fn rewards(&self) -> &Arc<RewardEngine> {
        &self.rewards
    }

    pub fn challenges(&self) -> &ChallengeTracker {
        &self.challenges
    }

    /// Record a user action against one dose obligation.
    ///
    /// The obligation row is the authority: the action passes through the
    /// state machine inside the ledger transaction, and reward side effects
    /// run only when the transition actually applied. Acting on a dose in a
    /// different terminal state surfaces as `EngineError::Conflict`.
    pub fn record_dose_action(
        &self,
        key: &DoseKey,
        action: DoseAction,
        now: DateTime<Utc>,
    ) -> Result<DoseActionOutcome> {
        let prior = self.ledger.get(key)?;
        let was_snoozed = prior
            .as_ref()
            .map(|o| o.status == DoseStatus::Snoozed)
            .unwrap_or(false);
        let meta = match &prior {
            Some(o) => ObligationMeta {
                user_id: o.user_id.clone(),
                medication_id: o.medication_id.clone(),
                medication_name: o.medication_name.clone(),
                time_of_day: o.time_of_day,
            },
            None => {
                let sched = self
                    .ledger
                    .schedule_by_id(&key.schedule_id)?
                    .ok_or_else(|| {
                        ValidationError::UnknownSchedule(key.schedule_id.clone())
                    })?;
                ObligationMeta {
                    user_id: sched.user_id,
                    medication_id: sched.medication_id,
                    medication_name: sched.medication_name,
                    time_of_day: sched.time_of_day,
                }
            }
        };

        let snooze_until = match action {
            DoseAction::Snooze => Some(now + Duration::minutes(self.config.snooze_minutes)),
            _ => None,
        };
        let (obligation, transition) = self.ledger.upsert_status(
            key,
            &meta,
            action.target_status(),
            Some(now),
            snooze_until,
            now,
        )?;

        let mut outcome = DoseActionOutcome {
            applied: transition == Transition::Apply,
            timeliness: None,
            coins_awarded: 0,
            spins_awarded: 0,
            streak_days: 0,
            milestone: None,
            new_badges: Vec::new(),
            obligation,
        };
        if transition == Transition::Apply && action == DoseAction::Take {
            self.settle_taken(&mut outcome, was_snoozed, now)?;
        }
        Ok(outcome)
    }

    /// Reward bookkeeping for an applied `taken` transition.
    fn settle_taken(
        &self,
        outcome: &mut DoseActionOutcome,
        was_snoozed: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user_id = outcome.obligation.user_id.clone();
        let cfg = &self.config.rewards;
        let store = self.rewards.store();

        let timeliness = Timeliness::classify(outcome.obligation.key.scheduled_for, now);
        outcome.timeliness = Some(timeliness);

        let mut account = store.get_or_create_account(&user_id, now)?;
        let previous_coins = account.coins;

        // The streak day ticks on the first taken dose of the calendar day.
        let first_of_day = self.ledger.taken_count_for_date(&user_id, now.date_naive())? == 1;
        if first_of_day {
            account.streak_days += 1;
        }
        if timeliness.is_on_time() {
            account.streak_multiplier =
                economy::stack_multiplier(account.streak_multiplier, cfg.multiplier_step);
        }

        let base = match timeliness {
            Timeliness::Early => cfg.on_time_coins + cfg.early_bonus_coins,
            Timeliness::OnTime => cfg.on_time_coins,
            Timeliness::Late => cfg.late_coins,
        };
        let double_active = store.has_active_item(&user_id, DOUBLE_COINS_ITEM, now)?;
        let coins = economy::effective_coins(base, account.streak_multiplier, double_active);
        account.coins += coins;
        outcome.coins_awarded = coins;

        if timeliness.is_on_time() {
            account.available_spins += cfg.spins_per_on_time_dose;
            outcome.spins_awarded = cfg.spins_per_on_time_dose;
        }

        outcome.milestone =
            economy::crossed_milestone(previous_coins, account.coins, &cfg.milestones);
        outcome.streak_days = account.streak_days;
        account.updated_at = now;
        store.save_account(&account)?;

        self.award_dose_badges(outcome, &account, timeliness, now)?;
        self.challenges.record_dose(
            &user_id,
            DoseEvent {
                time_of_day: outcome.obligation.time_of_day,
                timeliness,
                was_snoozed,
            },
            now,
        )?;

        info!(
            user_id,
            key = %outcome.obligation.key,
            timeliness = ?timeliness,
            coins,
            streak_days = account.streak_days,
            "dose taken"
        );
        Ok(())
    }

    fn award_dose_badges(
        &self,
        outcome: &mut DoseActionOutcome,
        account: &RewardAccount,
        timeliness: Timeliness,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user_id = &outcome.obligation.user_id;
        let badges = self.rewards.badges();
        let mut earned = Vec::new();

        earned.push(BadgeType::FirstDose);
        if timeliness == Timeliness::Early {
            earned.push(BadgeType::EarlyBird);
        }
        if account.streak_days >= 30 {
            earned.push(BadgeType::MonthStreak);
        } else if account.streak_days >= 7 {
            earned.push(BadgeType::WeekStreak);
        }
        for badge in earned {
            outcome.new_badges.extend(badges.award(user_id, badge, now)?);
        }
        Ok(())
    }

    /// Spend one spin on the slot machine.
    pub fn spin(&self, user_id: &str, now: DateTime<Utc>) -> Result<SpinResult> {
        let mut rng = StdRng::from_entropy();
        self.rewards.spin(user_id, now, &mut rng)
    }

    /// Claim the reward for a completed weekly challenge row. The tracker
    /// credits the account in the same store transaction as the claim flag.
    pub fn claim_challenge_reward(
        &self,
        progress_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(ChallengeProgress, ClaimOutcome)> {
        let (row, outcome) = self.challenges.claim(progress_id, now)?;
        info!(
            user_id = %row.user_id,
            challenge = %row.challenge_id,
            coins = outcome.coins_awarded,
            spins = outcome.spins_awarded,
            "challenge reward claimed"
        );
        Ok((row, outcome))
    }

    /// Today's obligations for a user, materialized from the active
    /// schedules. Rows already acted on keep their recorded status.
    pub fn due_today(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<DoseObligation>> {
        let mut due = Vec::new();
        for sched in self.ledger.active_schedules(user_id)? {
            let Some(key) = schedule::expand_for_date(&sched, now.date_naive())? else {
                continue;
            };
            let meta = ObligationMeta {
                user_id: sched.user_id.clone(),
                medication_id: sched.medication_id.clone(),
                medication_name: sched.medication_name.clone(),
                time_of_day: sched.time_of_day,
            };
            self.ledger.ensure_pending(&key, &meta, now)?;
            if let Some(obligation) = self.ledger.get(&key)? {
                due.push(obligation);
            }
        }
        due.sort_by(|a, b| a.key.scheduled_for.cmp(&b.key.scheduled_for));
        Ok(due)
    }

    pub fn account(&self, user_id: &str, now: DateTime<Utc>) -> Result<RewardAccount> {
        self.rewards.store().get_or_create_account(user_id, now)
    }

    pub fn run_reminder_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        self.reminders.run_sweep(now)
    }

    pub fn run_missed_dose_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        self.missed.run_sweep(now)
    }

    /// Materialize the new week's challenge rows for every known user,
    /// settle last week's perfect-week badge, and re-apply any spin left
    /// half-finished by a crash.
    pub fn run_weekly_rollover(&self, now: DateTime<Utc>) -> Result<usize> {
        let last_week = self.last_week_adherence(now)?;
        let mut users_touched = 0;
        for user_id in self.ledger.users()? {
            self.challenges.ensure_week(&user_id, now)?;
            if let Some(&(total, taken)) = last_week.get(&user_id) {
                if total > 0 && taken == total {
                    self.rewards
                        .badges()
                        .award(&user_id, BadgeType::PerfectWeek, now)?;
                }
            }
            users_touched += 1;
        }
        let recovered = self.rewards.recover_unapplied(now)?;
        info!(users_touched, recovered, "weekly rollover done");
        Ok(users_touched)
    }

    /// Per-user (total, taken) counts over the previous ISO week.
    fn last_week_adherence(
        &self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, (usize, usize)>> {
        let week = challenges::week_start(now.date_naive());
        let week_open = week.and_time(NaiveTime::MIN).and_utc();
        let start = week_open - Duration::days(7) - Duration::seconds(1);
        let end = week_open - Duration::seconds(1);

        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for obligation in self.ledger.query_window(start, end, None)? {
            let entry = counts.entry(obligation.user_id.clone()).or_default();
            entry.0 += 1;
            if obligation.status == DoseStatus::Taken {
                entry.1 += 1;
            }
        }
        Ok(counts)
    }
}
