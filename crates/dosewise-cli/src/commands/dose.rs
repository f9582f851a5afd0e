use chrono::{DateTime, Utc};
use clap::Subcommand;
use dosewise_core::schedule::{expand_for_date, DoseKey};
use dosewise_core::AdherenceEngine;

use super::{open_engine, parse_at, CliResult};

#[derive(Subcommand)]
pub enum DoseAction {
    /// List today's doses for a user
    Due {
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a dose as taken
    Take {
        /// Schedule id
        schedule: String,
        /// Scheduled instant (RFC3339); defaults to today's occurrence
        #[arg(long)]
        scheduled_for: Option<String>,
        /// Action instant (RFC3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Record a dose as intentionally skipped
    Skip {
        schedule: String,
        #[arg(long)]
        scheduled_for: Option<String>,
        #[arg(long)]
        at: Option<String>,
    },
    /// Snooze a dose
    Snooze {
        schedule: String,
        #[arg(long)]
        scheduled_for: Option<String>,
        #[arg(long)]
        at: Option<String>,
    },
}

pub fn run(action: DoseAction) -> CliResult {
    let engine = open_engine()?;
    match action {
        DoseAction::Due { user, json } => {
            let due = engine.due_today(&user, Utc::now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&due)?);
            } else {
                for d in due {
                    println!(
                        "{}  {}  {}  {}",
                        d.key.scheduled_for.to_rfc3339(),
                        d.medication_name,
                        d.status,
                        d.key.schedule_id
                    );
                }
            }
        }
        DoseAction::Take {
            schedule,
            scheduled_for,
            at,
        } => act(
            &engine,
            &schedule,
            scheduled_for.as_deref(),
            at.as_deref(),
            dosewise_core::DoseAction::Take,
        )?,
        DoseAction::Skip {
            schedule,
            scheduled_for,
            at,
        } => act(
            &engine,
            &schedule,
            scheduled_for.as_deref(),
            at.as_deref(),
            dosewise_core::DoseAction::Skip,
        )?,
        DoseAction::Snooze {
            schedule,
            scheduled_for,
            at,
        } => act(
            &engine,
            &schedule,
            scheduled_for.as_deref(),
            at.as_deref(),
            dosewise_core::DoseAction::Snooze,
        )?,
    }
    Ok(())
}

fn act(
    engine: &AdherenceEngine,
    schedule_id: &str,
    scheduled_for: Option<&str>,
    at: Option<&str>,
    action: dosewise_core::DoseAction,
) -> CliResult {
    let now = parse_at(at)?;
    let key = resolve_key(engine, schedule_id, scheduled_for, now)?;
    let outcome = engine.record_dose_action(&key, action, now)?;

    if !outcome.applied {
        println!("already {}", outcome.obligation.status);
        return Ok(());
    }
    println!("dose {}", outcome.obligation.status);
    if let Some(timeliness) = outcome.timeliness {
        println!("  timeliness: {timeliness:?}");
    }
    if outcome.coins_awarded > 0 {
        println!("  +{} coins", outcome.coins_awarded);
    }
    if outcome.spins_awarded > 0 {
        println!("  +{} spins", outcome.spins_awarded);
    }
    if let Some(milestone) = outcome.milestone {
        println!("  milestone reached: {milestone} coins");
    }
    for badge in &outcome.new_badges {
        println!("  new badge: {badge}");
    }
    Ok(())
}

/// Resolve the dose instant: explicit RFC3339 wins, otherwise today's
/// occurrence of the schedule.
fn resolve_key(
    engine: &AdherenceEngine,
    schedule_id: &str,
    scheduled_for: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DoseKey, Box<dyn std::error::Error>> {
    if let Some(raw) = scheduled_for {
        return Ok(DoseKey {
            schedule_id: schedule_id.to_string(),
            scheduled_for: DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc),
        });
    }
    let schedule = engine
        .ledger()
        .schedule_by_id(schedule_id)?
        .ok_or_else(|| format!("unknown schedule '{schedule_id}'"))?;
    expand_for_date(&schedule, now.date_naive())?
        .ok_or_else(|| format!("schedule '{schedule_id}' has no dose today").into())
}
