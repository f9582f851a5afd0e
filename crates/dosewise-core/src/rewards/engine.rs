//! Spin resolution and atomic prize application.
//!
//! A spin is: decrement one spin, resolve the prize, persist history,
//! apply the prize -- all under a per-account single-flight lock. History
//! is written before the account mutation; the account mutation and the
//! history's `applied` flag commit together, so a crash in between leaves
//! an unapplied row that [`RewardEngine::recover_unapplied`] completes
//! without re-rolling.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RewardConfig;
use crate::error::{EngineError, Result, RewardError};
use crate::rewards::economy;
use crate::rewards::slot::{self, Prize, SpinResult};
use crate::rewards::{BadgeAwarder, BadgeType, RewardAccount, DOUBLE_COINS_ITEM};
use crate::storage::{RewardStore, SpinHistoryRecord};

/// Resolves spins against the reward store.
pub struct RewardEngine {
    store: Arc<RewardStore>,
    badges: BadgeAwarder,
    config: RewardConfig,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the single-flight slot when the spin completes or aborts.
struct FlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    user_id: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.user_id);
    }
}

impl RewardEngine {
    pub fn new(store: Arc<RewardStore>, config: RewardConfig) -> Self {
        Self {
            badges: BadgeAwarder::new(Arc::clone(&store)),
            store,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<RewardStore> {
        &self.store
    }

    pub fn badges(&self) -> &BadgeAwarder {
        &self.badges
    }

    /// Resolve one spin for the account.
    ///
    /// Rejects with `NoSpinsAvailable` when the account has no spins and
    /// with `SpinInFlight` when another spin for the same account has not
    /// finished yet.
    pub fn spin<R: Rng>(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<SpinResult> {
        let _guard = self.acquire_flight(user_id)?;

        let mut account = self.store.get_or_create_account(user_id, now)?;
        if account.available_spins <= 0 {
            return Err(RewardError::NoSpinsAvailable.into());
        }

        let symbols = slot::roll_symbols(rng, &self.config.symbol_weights)?;
        let outcome = slot::classify(&symbols);
        let prize = slot::resolve_prize(
            &symbols,
            outcome,
            &self.config.triple_prizes,
            self.config.pair_coins,
            self.config.consolation_coins,
        );

        let double_active = self.store.has_active_item(user_id, DOUBLE_COINS_ITEM, now)?;
        let coins_credited = match &prize {
            Prize::Coins { amount } | Prize::Jackpot { amount } => {
                economy::effective_coins(*amount, account.streak_multiplier, double_active)
            }
            _ => 0,
        };

        let record = SpinHistoryRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbols,
            outcome,
            prize: prize.clone(),
            coins_credited,
            applied: false,
            created_at: now,
        };
        self.store.insert_spin_history(&record)?;

        let previous_coins = account.coins;
        Self::apply_prize(&mut account, &prize, coins_credited, now);
        account.updated_at = now;
        self.store.apply_spin(&account, &record.id)?;

        self.grant_prize_badges(user_id, &prize, now)?;

        let milestone =
            economy::crossed_milestone(previous_coins, account.coins, &self.config.milestones);
        info!(
            user_id,
            ?symbols,
            outcome = ?outcome,
            coins_credited,
            "spin resolved"
        );

        Ok(SpinResult {
            history_id: record.id,
            symbols,
            outcome,
            prize,
            coins_credited,
            spins_remaining: account.available_spins,
            milestone,
        })
    }

    /// Complete any interrupted spin applies left in history. The stored
    /// prize is honored as-is; nothing is re-rolled. A user with a spin in
    /// flight is skipped and picked up by a later pass rather than aborting
    /// recovery for everyone else.
    pub fn recover_unapplied(&self, now: DateTime<Utc>) -> Result<usize> {
        let pending = self.store.unapplied_spins()?;
        let mut count = 0;
        for record in pending {
            let _guard = match self.acquire_flight(&record.user_id) {
                Ok(guard) => guard,
                Err(EngineError::Reward(RewardError::SpinInFlight)) => {
                    warn!(user_id = %record.user_id, spin = %record.id, "spin in flight, deferring recovery");
                    continue;
                }
                Err(e) => return Err(e),
            };
            warn!(user_id = %record.user_id, spin = %record.id, "recovering unapplied spin");
            let mut account = self
                .store
                .get_or_create_account(&record.user_id, now)?;
            Self::apply_prize(&mut account, &record.prize, record.coins_credited, now);
            account.updated_at = now;
            self.store.apply_spin(&account, &record.id)?;
            self.grant_prize_badges(&record.user_id, &record.prize, now)?;
            count += 1;
        }
        Ok(count)
    }

    fn acquire_flight(&self, user_id: &str) -> Result<FlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap();
        if !set.insert(user_id.to_string()) {
            return Err(RewardError::SpinInFlight.into());
        }
        Ok(FlightGuard {
            set: &self.in_flight,
            user_id: user_id.to_string(),
        })
    }

    /// Mutate the account for a resolved prize. `coins_credited` is the
    /// already multiplier- and boost-adjusted amount.
    fn apply_prize(
        account: &mut RewardAccount,
        prize: &Prize,
        coins_credited: i64,
        now: DateTime<Utc>,
    ) {
        account.available_spins -= 1;
        account.total_spins_used += 1;
        match prize {
            Prize::Coins { .. } | Prize::Jackpot { .. } => {
                account.coins += coins_credited;
            }
            Prize::Multiplier { amount } => {
                account.streak_multiplier =
                    economy::stack_multiplier(account.streak_multiplier, *amount);
            }
            Prize::Shield { hours } => {
                economy::rearm_shield(account, now, *hours);
            }
            Prize::BonusSpins { count } => {
                account.available_spins += count;
            }
            Prize::Badge { .. } => {}
        }
    }

    fn grant_prize_badges(&self, user_id: &str, prize: &Prize, now: DateTime<Utc>) -> Result<()> {
        match prize {
            Prize::Badge { badge } => {
                self.badges.award(user_id, *badge, now)?;
            }
            Prize::Jackpot { .. } => {
                self.badges.award(user_id, BadgeType::Jackpot, now)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Grant the time-limited double-coins boost.
    pub fn grant_double_coins(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.store.grant_item(
            user_id,
            DOUBLE_COINS_ITEM,
            "boost",
            Some(now + Duration::hours(self.config.double_coins_hours)),
            now,
        )
    }
}
