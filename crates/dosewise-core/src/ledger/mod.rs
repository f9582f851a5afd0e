//! Dose obligation types and the status state machine.
//!
//! An obligation is one concrete "take medication X at instant Y" row,
//! identified by its natural key (schedule + scheduled instant). Rows are
//! materialized lazily and advance through the state machine in
//! [`state`]; the SQLite-backed store lives in [`crate::storage`].

pub mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{DoseKey, TimeOfDay};

pub use state::{DoseAction, Timeliness, Transition};

/// Status of a dose obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Pending,
    Taken,
    Skipped,
    Snoozed,
    Missed,
}

impl DoseStatus {
    /// Terminal statuses are final for the obligation's date.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DoseStatus::Taken | DoseStatus::Skipped | DoseStatus::Missed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DoseStatus::Pending => "pending",
            DoseStatus::Taken => "taken",
            DoseStatus::Skipped => "skipped",
            DoseStatus::Snoozed => "snoozed",
            DoseStatus::Missed => "missed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DoseStatus::Pending),
            "taken" => Some(DoseStatus::Taken),
            "skipped" => Some(DoseStatus::Skipped),
            "snoozed" => Some(DoseStatus::Snoozed),
            "missed" => Some(DoseStatus::Missed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized schedule fields carried on each obligation row so sweeps can
/// alert without a catalog lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObligationMeta {
    pub user_id: String,
    pub medication_id: String,
    pub medication_name: String,
    pub time_of_day: TimeOfDay,
}

/// A materialized dose obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseObligation {
    pub id: String,
    pub key: DoseKey,
    pub user_id: String,
    pub medication_id: String,
    pub medication_name: String,
    pub time_of_day: TimeOfDay,
    pub status: DoseStatus,
    /// Instant the user acted (took/skipped/snoozed).
    pub action_at: Option<DateTime<Utc>>,
    /// Resume instant while snoozed.
    pub snooze_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DoseObligation {
    /// Whether the obligation still counts as pending for reminder and
    /// missed-dose evaluation. A snoozed dose re-enters effective-pending
    /// once its resume instant passes, while keeping `snoozed` as its
    /// displayed status until acted on.
    pub fn effectively_pending(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            DoseStatus::Pending => true,
            DoseStatus::Snoozed => self.snooze_until.map(|until| until <= now).unwrap_or(true),
            _ => false,
        }
    }
}
