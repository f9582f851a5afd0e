use clap::Subcommand;
use dosewise_core::{ScheduleDefinition, TimeOfDay};
use uuid::Uuid;

use super::{open_engine, CliResult};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Add or update a medication schedule
    Add {
        /// Patient user id
        #[arg(long)]
        user: String,
        /// Medication id
        #[arg(long)]
        medication: String,
        /// Human-readable medication name
        #[arg(long)]
        name: String,
        /// Clock time in HH:MM (UTC)
        #[arg(long)]
        time: String,
        /// Time-of-day slot: morning, afternoon, evening, bedtime
        #[arg(long, default_value = "morning")]
        slot: String,
        /// Active weekdays as comma-separated 0-6 (0=Sun); empty = every day
        #[arg(long, default_value = "")]
        weekdays: String,
        /// Schedule id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// List a user's active schedules
    List {
        #[arg(long)]
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deactivate a schedule
    Deactivate {
        id: String,
    },
}

pub fn run(action: ScheduleAction) -> CliResult {
    let engine = open_engine()?;
    match action {
        ScheduleAction::Add {
            user,
            medication,
            name,
            time,
            slot,
            weekdays,
            id,
        } => {
            let time_of_day =
                TimeOfDay::parse(&slot).ok_or_else(|| format!("unknown slot '{slot}'"))?;
            let weekdays = parse_weekdays(&weekdays)?;
            let schedule = ScheduleDefinition {
                id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                user_id: user,
                medication_id: medication,
                medication_name: name,
                clock_time: time,
                time_of_day,
                weekdays,
                active: true,
            };
            engine.ledger().upsert_schedule(&schedule)?;
            println!("schedule saved: {}", schedule.id);
        }
        ScheduleAction::List { user, json } => {
            let schedules = engine.ledger().active_schedules(&user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schedules)?);
            } else {
                for s in schedules {
                    println!(
                        "{}  {}  {} ({})  weekdays={:?}",
                        s.id,
                        s.clock_time,
                        s.medication_name,
                        s.time_of_day.as_str(),
                        s.weekdays
                    );
                }
            }
        }
        ScheduleAction::Deactivate { id } => {
            let mut schedule = engine
                .ledger()
                .schedule_by_id(&id)?
                .ok_or_else(|| format!("unknown schedule '{id}'"))?;
            schedule.active = false;
            engine.ledger().upsert_schedule(&schedule)?;
            println!("schedule deactivated: {id}");
        }
    }
    Ok(())
}

fn parse_weekdays(raw: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut days = Vec::new();
    for part in raw.split(',') {
        let day: u8 = part.trim().parse()?;
        if day > 6 {
            return Err(format!("weekday {day} out of range 0-6").into());
        }
        days.push(day);
    }
    Ok(days)
}
