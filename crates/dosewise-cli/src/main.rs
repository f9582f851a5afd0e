use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dosewise-cli", version, about = "Dosewise adherence and reward engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Medication schedule management
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Caregiver relationships
    Caregiver {
        #[command(subcommand)]
        action: commands::caregiver::CaregiverAction,
    },
    /// Dose actions and listings
    Dose {
        #[command(subcommand)]
        action: commands::dose::DoseAction,
    },
    /// Reminder, missed-dose, and rollover sweeps
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
    /// Slot machine spins
    Spin {
        #[command(subcommand)]
        action: commands::spin::SpinAction,
    },
    /// Weekly challenges
    Challenge {
        #[command(subcommand)]
        action: commands::challenge::ChallengeAction,
    },
    /// Reward account, badges, and inventory
    Account {
        #[command(subcommand)]
        action: commands::account::AccountAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Caregiver { action } => commands::caregiver::run(action),
        Commands::Dose { action } => commands::dose::run(action),
        Commands::Sweep { action } => commands::sweep::run(action),
        Commands::Spin { action } => commands::spin::run(action),
        Commands::Challenge { action } => commands::challenge::run(action),
        Commands::Account { action } => commands::account::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
