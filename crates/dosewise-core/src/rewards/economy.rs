//! Streak economy rules: multiplier stacking, shield re-arming, milestone
//! crossing, and boost-adjusted coin awards.
//!
//! Everything here is a pure function over account values; persistence and
//! locking live with the callers.

use chrono::{DateTime, Duration, Utc};

use super::RewardAccount;

/// Lower bound of the streak multiplier.
pub const MULTIPLIER_FLOOR: f64 = 1.0;
/// Upper bound of the streak multiplier.
pub const MULTIPLIER_CAP: f64 = 3.0;

/// Stack a multiplier prize additively, clamped to the cap.
pub fn stack_multiplier(current: f64, add: f64) -> f64 {
    (current + add).clamp(MULTIPLIER_FLOOR, MULTIPLIER_CAP)
}

/// Re-arm the streak shield: expiry becomes `now + hours`. A grant while a
/// shield is already active re-arms rather than compounds, so expiry never
/// exceeds one full grant from now.
pub fn rearm_shield(account: &mut RewardAccount, now: DateTime<Utc>, hours: i64) {
    account.shield_expires_at = Some(now + Duration::hours(hours));
}

/// Consume an active shield, if any. Returns whether one was consumed.
pub fn consume_shield(account: &mut RewardAccount, now: DateTime<Utc>) -> bool {
    if account.shield_active(now) {
        account.shield_expires_at = None;
        true
    } else {
        false
    }
}

/// The lowest milestone crossed by a single balance update, if any.
///
/// At most one event fires per update even when a large award jumps past
/// several thresholds; the client celebrates the lowest one.
pub fn crossed_milestone(previous: i64, new: i64, milestones: &[i64]) -> Option<i64> {
    milestones
        .iter()
        .copied()
        .find(|&m| previous < m && new >= m)
}

/// Scale a base coin award by the streak multiplier (floored to an integer)
/// and then double it once when a double-coins boost is active.
pub fn effective_coins(base: i64, multiplier: f64, double_active: bool) -> i64 {
    let scaled = (base as f64 * multiplier).floor() as i64;
    if double_active {
        scaled * 2
    } else {
        scaled
    }
}
