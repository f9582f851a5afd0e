use chrono::Utc;
use clap::Subcommand;

use super::{open_engine, CliResult};

#[derive(Subcommand)]
pub enum ChallengeAction {
    /// Show this week's challenge progress for a user
    List {
        user: String,
    },
    /// Claim the reward for a completed challenge row
    Claim {
        /// Progress row id (from `challenge list`)
        progress: String,
    },
}

pub fn run(action: ChallengeAction) -> CliResult {
    let engine = open_engine()?;
    match action {
        ChallengeAction::List { user } => {
            let now = Utc::now();
            for row in engine.challenges().week_progress(&user, now)? {
                let def = engine.challenges().definition(&row.challenge_id);
                let (name, target) = def
                    .map(|d| (d.name.as_str(), d.target))
                    .unwrap_or((row.challenge_id.as_str(), 0));
                let state = if row.reward_claimed {
                    "claimed"
                } else if row.completed {
                    "completed"
                } else {
                    "in progress"
                };
                println!("{}  {name}  {}/{target}  {state}", row.id, row.progress);
            }
        }
        ChallengeAction::Claim { progress } => {
            let (row, outcome) = engine.claim_challenge_reward(&progress, Utc::now())?;
            println!(
                "claimed {}: +{} coins, +{} spins",
                row.challenge_id, outcome.coins_awarded, outcome.spins_awarded
            );
        }
    }
    Ok(())
}
