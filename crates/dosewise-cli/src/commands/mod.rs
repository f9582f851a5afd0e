pub mod account;
pub mod caregiver;
pub mod challenge;
pub mod config;
pub mod dose;
pub mod schedule;
pub mod spin;
pub mod sweep;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dosewise_core::{
    AdherenceEngine, DoseLedger, EngineConfig, NotificationTransport, RewardStore,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Transport that prints deliveries to stdout. Sweeps run from the
/// terminal report what a push/SMS gateway would have sent.
pub struct ConsoleNotifier;

impl NotificationTransport for ConsoleNotifier {
    fn send(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        _metadata: &serde_json::Value,
    ) -> dosewise_core::Result<bool> {
        println!("[notify {user_id}] {title}: {body}");
        Ok(true)
    }

    fn send_sms(&self, phone: &str, body: &str) -> dosewise_core::Result<bool> {
        println!("[sms {phone}] {body}");
        Ok(true)
    }
}

/// Open the engine against the on-disk databases and config.
pub fn open_engine() -> Result<AdherenceEngine, Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    let ledger = Arc::new(DoseLedger::open()?);
    let store = Arc::new(RewardStore::open()?);
    Ok(AdherenceEngine::new(
        ledger,
        store,
        Arc::new(ConsoleNotifier),
        config,
    ))
}

/// Parse an optional RFC3339 instant, defaulting to now.
pub fn parse_at(at: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match at {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
