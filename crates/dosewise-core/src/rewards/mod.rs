//! Reward economy: slot spins, streak multipliers, boosts, badges,
//! weekly challenges, and the coin/spin bookkeeping behind them.
//!
//! The economy's only shared mutable state is the per-user
//! [`RewardAccount`]; symbol weights, prize values, badge and challenge
//! definitions are read-only configuration loaded once per process.

pub mod badges;
pub mod challenges;
pub mod economy;
pub mod engine;
pub mod slot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use badges::{BadgeAwarder, BadgeType};
pub use challenges::{ChallengeDefinition, ChallengeProgress, ChallengeTracker, ClaimOutcome};
pub use economy::{MULTIPLIER_CAP, MULTIPLIER_FLOOR};
pub use engine::RewardEngine;
pub use slot::{Prize, SlotSymbol, SpinOutcome, SpinResult};

/// Per-user reward account. Mutated only by the reward engine under a
/// single-writer-per-account discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardAccount {
    pub user_id: String,
    /// Coin balance, never negative.
    pub coins: i64,
    pub available_spins: i64,
    pub total_spins_used: i64,
    /// Streak multiplier, bounded [1.0, 3.0].
    pub streak_multiplier: f64,
    /// Consecutive adherent days.
    pub streak_days: i64,
    /// Streak shield expiry; the shield is active while this is in the future.
    pub shield_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RewardAccount {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            coins: 0,
            available_spins: 0,
            total_spins_used: 0,
            streak_multiplier: MULTIPLIER_FLOOR,
            streak_days: 0,
            shield_expires_at: None,
            updated_at: now,
        }
    }

    pub fn shield_active(&self, now: DateTime<Utc>) -> bool {
        self.shield_expires_at.map(|at| at > now).unwrap_or(false)
    }
}

/// A non-cosmetic or cosmetic item held by a user, with optional expiry
/// for time-limited effects like the double-coins boost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub user_id: String,
    pub item_id: String,
    /// Cosmetic category; at most one equipped item per category.
    pub category: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub equipped: bool,
    pub acquired_at: DateTime<Utc>,
}

/// Item id of the time-limited double-coins boost.
pub const DOUBLE_COINS_ITEM: &str = "double_coins";
