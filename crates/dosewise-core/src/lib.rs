//! # Dosewise Core Library
//!
//! This library provides the core business logic for the Dosewise adherence
//! and reward engine. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, with any outer
//! surface (API server, desktop app) being a thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Ledger**: SQLite-backed dose obligations keyed by the natural key
//!   (schedule, scheduled instant), with a small status state machine that
//!   makes every user action idempotent
//! - **Schedule**: Pure expansion of recurring medication schedules into
//!   concrete dose instants
//! - **Dispatch**: Receipted reminder and missed-dose sweeps that deliver
//!   each notification at most once under overlapping runs
//! - **Rewards**: Coin/spin economy with streak multipliers, a weighted slot
//!   machine, badges, and weekly challenges
//!
//! ## Key Components
//!
//! - [`AdherenceEngine`]: Facade wiring the ledger, dispatchers, and rewards
//! - [`DoseLedger`]: Obligation, schedule, and receipt persistence
//! - [`RewardEngine`]: Spin resolution with crash-safe prize application
//! - [`EngineConfig`]: TOML-backed configuration for every tunable constant

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod rewards;
pub mod schedule;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, GraceConfig, ReminderConfig, RewardConfig};
pub use dispatch::{
    CaregiverContact, CaregiverDirectory, MedicationCatalog, MissedDoseDetector,
    NotificationTransport, ReminderDispatcher, SweepReport,
};
pub use engine::{AdherenceEngine, DoseActionOutcome};
pub use error::{EngineError, Result, RewardError, StorageError, ValidationError};
pub use ledger::state::{DoseAction, Timeliness, Transition};
pub use ledger::{DoseObligation, DoseStatus, ObligationMeta};
pub use rewards::{
    BadgeAwarder, BadgeType, ChallengeTracker, Prize, RewardAccount, RewardEngine, SlotSymbol,
    SpinOutcome, SpinResult,
};
pub use schedule::{DoseKey, ScheduleDefinition, TimeOfDay};
pub use storage::{data_dir, DoseLedger, RewardStore};
