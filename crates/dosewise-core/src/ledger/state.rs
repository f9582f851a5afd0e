//! Dose status state machine.
//!
//! ```text
//! pending -> taken | skipped | snoozed | missed
//! snoozed -> taken | skipped | snoozed (re-snooze) | missed
//! ```
//!
//! Terminal statuses (taken, skipped, missed) are final. Re-submitting the
//! identical terminal status is a no-op; any other write against a terminal
//! row is a conflict. `missed` is reserved for the missed-dose detector and
//! only legal after the grace window has elapsed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::DoseStatus;

/// A user-initiated action on a dose obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseAction {
    Take,
    Skip,
    Snooze,
}

impl DoseAction {
    pub fn target_status(&self) -> DoseStatus {
        match self {
            DoseAction::Take => DoseStatus::Taken,
            DoseAction::Skip => DoseStatus::Skipped,
            DoseAction::Snooze => DoseStatus::Snoozed,
        }
    }
}

/// Outcome of validating a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The write should be applied.
    Apply,
    /// Identical terminal re-submission; nothing to do.
    Noop,
}

/// Validate a requested status write against the current status.
///
/// `current` is `None` when the obligation has not been materialized yet,
/// which is equivalent to `pending`.
pub fn validate(
    current: Option<DoseStatus>,
    requested: DoseStatus,
) -> Result<Transition, DoseStatus> {
    let current = current.unwrap_or(DoseStatus::Pending);

    if current.is_terminal() {
        if requested == current {
            return Ok(Transition::Noop);
        }
        return Err(current);
    }

    // pending and snoozed accept any forward transition, including another
    // snooze that pushes the resume instant out again.
    Ok(Transition::Apply)
}

/// On-time classification for a taken dose, computed at the moment of taking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeliness {
    /// Within +/- 5 minutes of the scheduled instant.
    Early,
    /// Within +/- 30 minutes.
    OnTime,
    /// Outside the on-time window.
    Late,
}

impl Timeliness {
    pub fn classify(scheduled: DateTime<Utc>, taken: DateTime<Utc>) -> Self {
        let delta = (taken - scheduled).abs();
        if delta <= Duration::minutes(5) {
            Timeliness::Early
        } else if delta <= Duration::minutes(30) {
            Timeliness::OnTime
        } else {
            Timeliness::Late
        }
    }

    /// Early doses are on time too.
    pub fn is_on_time(&self) -> bool {
        matches!(self, Timeliness::Early | Timeliness::OnTime)
    }
}

/// Whether an obligation scheduled at `scheduled` is inside the missed
/// grace window at `now`: past the grace delay but not yet past the cutoff.
pub fn missed_eligible(
    scheduled: DateTime<Utc>,
    now: DateTime<Utc>,
    grace_minutes: i64,
    cutoff_minutes: i64,
) -> bool {
    let age = now - scheduled;
    age > Duration::minutes(grace_minutes) && age <= Duration::minutes(cutoff_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn pending_accepts_all_transitions() {
        for requested in [
            DoseStatus::Taken,
            DoseStatus::Skipped,
            DoseStatus::Snoozed,
            DoseStatus::Missed,
        ] {
            assert_eq!(validate(None, requested), Ok(Transition::Apply));
            assert_eq!(
                validate(Some(DoseStatus::Pending), requested),
                Ok(Transition::Apply)
            );
        }
    }

    #[test]
    fn snoozed_can_be_resnoozed_or_resolved() {
        assert_eq!(
            validate(Some(DoseStatus::Snoozed), DoseStatus::Snoozed),
            Ok(Transition::Apply)
        );
        assert_eq!(
            validate(Some(DoseStatus::Snoozed), DoseStatus::Taken),
            Ok(Transition::Apply)
        );
    }

    #[test]
    fn terminal_resubmission_is_noop() {
        assert_eq!(
            validate(Some(DoseStatus::Taken), DoseStatus::Taken),
            Ok(Transition::Noop)
        );
        assert_eq!(
            validate(Some(DoseStatus::Missed), DoseStatus::Missed),
            Ok(Transition::Noop)
        );
    }

    #[test]
    fn terminal_rejects_conflicting_writes() {
        assert_eq!(
            validate(Some(DoseStatus::Taken), DoseStatus::Missed),
            Err(DoseStatus::Taken)
        );
        assert_eq!(
            validate(Some(DoseStatus::Skipped), DoseStatus::Taken),
            Err(DoseStatus::Skipped)
        );
    }

    #[test]
    fn timeliness_boundaries() {
        let scheduled = at(8, 0);
        assert_eq!(Timeliness::classify(scheduled, at(8, 3)), Timeliness::Early);
        assert_eq!(Timeliness::classify(scheduled, at(7, 57)), Timeliness::Early);
        assert_eq!(Timeliness::classify(scheduled, at(8, 20)), Timeliness::OnTime);
        assert_eq!(Timeliness::classify(scheduled, at(7, 31)), Timeliness::OnTime);
        assert_eq!(Timeliness::classify(scheduled, at(8, 45)), Timeliness::Late);
        assert!(Timeliness::Early.is_on_time());
        assert!(!Timeliness::Late.is_on_time());
    }

    #[test]
    fn missed_grace_boundary() {
        let scheduled = at(8, 0);
        // 29 minutes in: still within grace, not eligible.
        assert!(!missed_eligible(scheduled, at(8, 29), 30, 120));
        // 31 minutes in: eligible.
        assert!(missed_eligible(scheduled, at(8, 31), 30, 120));
        // Past the 2 hour cutoff: no longer swept.
        assert!(!missed_eligible(scheduled, at(10, 1), 30, 120));
    }
}
