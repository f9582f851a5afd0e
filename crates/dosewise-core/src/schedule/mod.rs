//! Medication schedule definitions and daily expansion.
//!
//! A [`ScheduleDefinition`] describes a recurring dose ("Metformin at 08:00
//! on weekdays"). [`expand_for_date`] turns a definition into the concrete
//! obligation key for one calendar date, or nothing when the weekday set
//! excludes that date. Expansion is pure; materialization into the ledger
//! happens lazily elsewhere.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Time-of-day bucket a dose belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Bedtime,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Bedtime => "bedtime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "morning" => Some(TimeOfDay::Morning),
            "afternoon" => Some(TimeOfDay::Afternoon),
            "evening" => Some(TimeOfDay::Evening),
            "bedtime" => Some(TimeOfDay::Bedtime),
            _ => None,
        }
    }
}

/// A recurring dose schedule owned by a user.
///
/// Created and edited by medication management; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: String,
    pub user_id: String,
    pub medication_id: String,
    pub medication_name: String,
    /// Clock time in "HH:MM".
    pub clock_time: String,
    pub time_of_day: TimeOfDay,
    /// Active weekdays, 0=Sun ... 6=Sat. Empty = every day.
    pub weekdays: Vec<u8>,
    pub active: bool,
}

/// Natural key of a dose obligation: one schedule, one concrete instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoseKey {
    pub schedule_id: String,
    pub scheduled_for: DateTime<Utc>,
}

impl std::fmt::Display for DoseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.schedule_id, self.scheduled_for.to_rfc3339())
    }
}

/// Parse a "HH:MM" clock time string.
pub fn parse_clock_time(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ValidationError::InvalidClockTime {
        value: value.to_string(),
    })
}

/// Expand a schedule for one calendar date.
///
/// Returns the obligation key for that date, or `None` when the schedule's
/// weekday set excludes the date's weekday. An empty weekday set means the
/// schedule fires every day.
pub fn expand_for_date(
    schedule: &ScheduleDefinition,
    date: NaiveDate,
) -> Result<Option<DoseKey>, ValidationError> {
    let time = parse_clock_time(&schedule.clock_time)?;

    if !schedule.weekdays.is_empty() {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        if !schedule.weekdays.contains(&weekday) {
            return Ok(None);
        }
    }

    Ok(Some(DoseKey {
        schedule_id: schedule.id.clone(),
        scheduled_for: date.and_time(time).and_utc(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(clock_time: &str, weekdays: Vec<u8>) -> ScheduleDefinition {
        ScheduleDefinition {
            id: "sched-1".to_string(),
            user_id: "user-1".to_string(),
            medication_id: "med-1".to_string(),
            medication_name: "Metformin".to_string(),
            clock_time: clock_time.to_string(),
            time_of_day: TimeOfDay::Morning,
            weekdays,
            active: true,
        }
    }

    #[test]
    fn expands_every_day_when_weekdays_empty() {
        let sched = schedule("08:00", vec![]);
        // 2026-03-02 is a Monday
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let key = expand_for_date(&sched, date).unwrap().unwrap();
        assert_eq!(key.schedule_id, "sched-1");
        assert_eq!(key.scheduled_for.to_rfc3339(), "2026-03-02T08:00:00+00:00");
    }

    #[test]
    fn skips_excluded_weekday() {
        // Mon-Fri only (1..=5 with 0=Sun)
        let sched = schedule("08:00", vec![1, 2, 3, 4, 5]);
        let saturday = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert!(expand_for_date(&sched, saturday).unwrap().is_none());

        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(expand_for_date(&sched, monday).unwrap().is_some());
    }

    #[test]
    fn rejects_malformed_clock_time() {
        let sched = schedule("8 o'clock", vec![]);
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let err = expand_for_date(&sched, date).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidClockTime { .. }));
    }

    #[test]
    fn schedule_serialization() {
        let sched = schedule("21:30", vec![0, 6]);
        let json = serde_json::to_string(&sched).unwrap();
        let decoded: ScheduleDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.clock_time, "21:30");
        assert_eq!(decoded.weekdays, vec![0, 6]);
    }
}
