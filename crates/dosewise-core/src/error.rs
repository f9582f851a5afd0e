//! Core error types for dosewise-core.
//!
//! This module defines the error hierarchy used across the engine. Expected
//! domain outcomes (no spins left, reward already claimed, invalid schedule
//! input) are modeled as variants returned to the caller rather than logged
//! as failures.

use thiserror::Error;

/// Top-level error type for the adherence engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Validation errors (bad input, rejected without retry)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Reward economy errors (expected domain outcomes)
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    /// A write lost a natural-key race and must be retried with a fresh read
    #[error("Conflicting write for obligation {key}: {current} is terminal, rejected {requested}")]
    Conflict {
        key: String,
        current: String,
        requested: String,
    },

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: std::path::PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The database is busy or locked; callers retry with backoff
    #[error("Storage unavailable (busy or locked)")]
    Unavailable,

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Clock time was not valid "HH:MM"
    #[error("Invalid clock time '{value}': expected HH:MM")]
    InvalidClockTime { value: String },

    /// Weekday index outside 0..=6
    #[error("Invalid weekday index {0}: expected 0 (Sun) through 6 (Sat)")]
    InvalidWeekday(u8),

    /// Referenced schedule does not exist
    #[error("Unknown schedule: {0}")]
    UnknownSchedule(String),

    /// A status transition the state machine forbids
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Reward economy errors.
#[derive(Error, Debug)]
pub enum RewardError {
    /// Account has no spins left
    #[error("No spins available")]
    NoSpinsAvailable,

    /// A spin for this account is already in flight
    #[error("A spin is already in flight for this account")]
    SpinInFlight,

    /// Challenge reward was already claimed
    #[error("Challenge reward already claimed")]
    AlreadyClaimed,

    /// Challenge is not yet completed
    #[error("Challenge is not completed yet")]
    ChallengeNotComplete,

    /// Referenced challenge progress row does not exist
    #[error("Unknown challenge progress row: {0}")]
    UnknownChallenge(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StorageError::Unavailable
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(StorageError::from(err))
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
