use clap::Subcommand;

use super::{open_engine, CliResult};

#[derive(Subcommand)]
pub enum CaregiverAction {
    /// Link a caregiver to a patient for missed-dose alerts
    Add {
        /// Patient user id
        #[arg(long)]
        patient: String,
        /// Caregiver user id
        #[arg(long)]
        caregiver: String,
        /// SMS fallback number
        #[arg(long)]
        phone: Option<String>,
        /// Disable alerts for this caregiver
        #[arg(long)]
        muted: bool,
    },
    /// List alertable caregivers for a patient
    List {
        patient: String,
    },
}

pub fn run(action: CaregiverAction) -> CliResult {
    let engine = open_engine()?;
    match action {
        CaregiverAction::Add {
            patient,
            caregiver,
            phone,
            muted,
        } => {
            engine
                .ledger()
                .add_caregiver(&patient, &caregiver, phone.as_deref(), !muted)?;
            println!("caregiver linked: {caregiver} -> {patient}");
        }
        CaregiverAction::List { patient } => {
            for (caregiver_id, phone) in engine.ledger().alertable_caregivers(&patient)? {
                match phone {
                    Some(phone) => println!("{caregiver_id}  sms={phone}"),
                    None => println!("{caregiver_id}"),
                }
            }
        }
    }
    Ok(())
}
