pub mod ledger_db;
pub mod reward_db;

pub use ledger_db::DoseLedger;
pub use reward_db::{RewardStore, SpinHistoryRecord};

use std::path::PathBuf;

use crate::error::{EngineError, Result};

/// Returns `~/.config/dosewise[-dev]/` based on DOSEWISE_ENV.
///
/// Set DOSEWISE_ENV=dev to use the development data directory.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DOSEWISE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("dosewise-dev")
    } else {
        base_dir.join("dosewise")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| EngineError::Custom(format!("create {}: {e}", dir.display())))?;
    Ok(dir)
}
