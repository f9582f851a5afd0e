use chrono::Utc;
use clap::Subcommand;

use super::{open_engine, CliResult};

#[derive(Subcommand)]
pub enum SpinAction {
    /// Spend one spin
    Play {
        user: String,
    },
    /// Show recent spin results
    History {
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Re-apply spins left unapplied by a crash
    Recover,
}

pub fn run(action: SpinAction) -> CliResult {
    let engine = open_engine()?;
    match action {
        SpinAction::Play { user } => {
            let result = engine.spin(&user, Utc::now())?;
            let symbols: Vec<&str> = result.symbols.iter().map(|s| s.as_str()).collect();
            println!("[{}]  {:?}", symbols.join(" | "), result.outcome);
            println!("  prize: {}", serde_json::to_string(&result.prize)?);
            if result.coins_credited > 0 {
                println!("  +{} coins", result.coins_credited);
            }
            if let Some(milestone) = result.milestone {
                println!("  milestone reached: {milestone} coins");
            }
            println!("  spins remaining: {}", result.spins_remaining);
        }
        SpinAction::History { user, limit } => {
            for record in engine.rewards().store().spin_history(&user, limit)? {
                let symbols: Vec<&str> = record.symbols.iter().map(|s| s.as_str()).collect();
                println!(
                    "{}  [{}]  {:?}  +{}{}",
                    record.created_at.to_rfc3339(),
                    symbols.join(" | "),
                    record.outcome,
                    record.coins_credited,
                    if record.applied { "" } else { "  (unapplied)" }
                );
            }
        }
        SpinAction::Recover => {
            let recovered = engine.rewards().recover_unapplied(Utc::now())?;
            println!("recovered {recovered} spins");
        }
    }
    Ok(())
}
