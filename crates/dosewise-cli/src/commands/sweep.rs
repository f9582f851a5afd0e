use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use dosewise_core::{Clock, SystemClock};

use super::{open_engine, CliResult};

#[derive(Subcommand)]
pub enum SweepAction {
    /// Run one reminder sweep
    Reminders,
    /// Run one missed-dose sweep
    Missed,
    /// Seed the week's challenge rows and recover unfinished spins
    Rollover,
    /// Run both sweeps on an interval until interrupted
    Watch {
        /// Seconds between sweep passes
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}

pub fn run(action: SweepAction) -> CliResult {
    let engine = open_engine()?;
    match action {
        SweepAction::Reminders => {
            let report = engine.run_reminder_sweep(Utc::now())?;
            println!("reminders: {report}");
        }
        SweepAction::Missed => {
            let report = engine.run_missed_dose_sweep(Utc::now())?;
            println!("missed: {report}");
        }
        SweepAction::Rollover => {
            let users = engine.run_weekly_rollover(Utc::now())?;
            println!("rollover: {users} users");
        }
        SweepAction::Watch { interval } => {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(async {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                loop {
                    ticker.tick().await;
                    let now = clock.now();
                    match engine.run_reminder_sweep(now) {
                        Ok(report) => println!("reminders: {report}"),
                        Err(e) => tracing::warn!(error = %e, "reminder sweep failed"),
                    }
                    match engine.run_missed_dose_sweep(now) {
                        Ok(report) => println!("missed: {report}"),
                        Err(e) => tracing::warn!(error = %e, "missed sweep failed"),
                    }
                }
            })
        }
    }
    Ok(())
}
