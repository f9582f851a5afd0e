//! Idempotent achievement badges.
//!
//! Granting an already-held badge is a silent no-op. Derived badges
//! (collector) are re-evaluated after every grant in a single pass: a badge
//! granted as a side effect of that evaluation does not feed back into the
//! same pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::storage::RewardStore;

/// Distinct badges required for the collector badge.
const COLLECTOR_THRESHOLD: i64 = 5;

/// Named achievement badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    /// First dose ever taken.
    FirstDose,
    /// First dose taken within the early window.
    EarlyBird,
    /// Seven-day adherence streak.
    WeekStreak,
    /// Thirty-day adherence streak.
    MonthStreak,
    /// Every scheduled dose taken for a full ISO week.
    PerfectWeek,
    /// Triple gems on the slot machine.
    LuckyGem,
    /// Jackpot spin.
    Jackpot,
    /// Holding five distinct badges.
    Collector,
}

impl BadgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::FirstDose => "first_dose",
            BadgeType::EarlyBird => "early_bird",
            BadgeType::WeekStreak => "week_streak",
            BadgeType::MonthStreak => "month_streak",
            BadgeType::PerfectWeek => "perfect_week",
            BadgeType::LuckyGem => "lucky_gem",
            BadgeType::Jackpot => "jackpot",
            BadgeType::Collector => "collector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first_dose" => Some(BadgeType::FirstDose),
            "early_bird" => Some(BadgeType::EarlyBird),
            "week_streak" => Some(BadgeType::WeekStreak),
            "month_streak" => Some(BadgeType::MonthStreak),
            "perfect_week" => Some(BadgeType::PerfectWeek),
            "lucky_gem" => Some(BadgeType::LuckyGem),
            "jackpot" => Some(BadgeType::Jackpot),
            "collector" => Some(BadgeType::Collector),
            _ => None,
        }
    }
}

impl std::fmt::Display for BadgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grants badges against the reward store.
pub struct BadgeAwarder {
    store: Arc<RewardStore>,
}

impl BadgeAwarder {
    pub fn new(store: Arc<RewardStore>) -> Self {
        Self { store }
    }

    /// Grant a badge. Returns every badge newly granted by this call,
    /// including derived ones; empty when the user already held it.
    pub fn award(
        &self,
        user_id: &str,
        badge: BadgeType,
        now: DateTime<Utc>,
    ) -> Result<Vec<BadgeType>> {
        let mut granted = Vec::new();
        if self.store.insert_badge(user_id, badge.as_str(), now)? {
            debug!(user_id, badge = badge.as_str(), "badge granted");
            granted.push(badge);
            // One evaluation pass; derived grants inside it do not count
            // toward further thresholds until the next award.
            self.evaluate_derived(user_id, now, &mut granted)?;
        }
        Ok(granted)
    }

    fn evaluate_derived(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        granted: &mut Vec<BadgeType>,
    ) -> Result<()> {
        let held = self.store.badge_count(user_id)?;
        let collector_held = granted.contains(&BadgeType::Collector);
        if held >= COLLECTOR_THRESHOLD && !collector_held {
            if self
                .store
                .insert_badge(user_id, BadgeType::Collector.as_str(), now)?
            {
                debug!(user_id, "collector badge granted");
                granted.push(BadgeType::Collector);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn awarder() -> BadgeAwarder {
        BadgeAwarder::new(Arc::new(RewardStore::open_memory().unwrap()))
    }

    #[test]
    fn double_award_is_silent_noop() {
        let awarder = awarder();
        let now = Utc::now();
        let first = awarder.award("user-1", BadgeType::FirstDose, now).unwrap();
        assert_eq!(first, vec![BadgeType::FirstDose]);

        let second = awarder.award("user-1", BadgeType::FirstDose, now).unwrap();
        assert!(second.is_empty());
        assert_eq!(awarder.store.badge_count("user-1").unwrap(), 1);
    }

    #[test]
    fn collector_fires_at_five_distinct_badges() {
        let awarder = awarder();
        let now = Utc::now();
        for badge in [
            BadgeType::FirstDose,
            BadgeType::EarlyBird,
            BadgeType::WeekStreak,
            BadgeType::LuckyGem,
        ] {
            let granted = awarder.award("user-1", badge, now).unwrap();
            assert_eq!(granted, vec![badge]);
        }

        // Fifth distinct badge triggers the derived collector grant, and
        // the collector badge itself (a sixth) does not cascade further.
        let granted = awarder.award("user-1", BadgeType::Jackpot, now).unwrap();
        assert_eq!(granted, vec![BadgeType::Jackpot, BadgeType::Collector]);
        assert_eq!(awarder.store.badge_count("user-1").unwrap(), 6);
    }

    #[test]
    fn badge_type_round_trips_through_str() {
        for badge in [
            BadgeType::FirstDose,
            BadgeType::EarlyBird,
            BadgeType::WeekStreak,
            BadgeType::MonthStreak,
            BadgeType::PerfectWeek,
            BadgeType::LuckyGem,
            BadgeType::Jackpot,
            BadgeType::Collector,
        ] {
            assert_eq!(BadgeType::parse(badge.as_str()), Some(badge));
        }
    }
}
