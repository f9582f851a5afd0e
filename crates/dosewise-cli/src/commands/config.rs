use clap::Subcommand;
use dosewise_core::EngineConfig;

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write the default configuration to disk
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Show => {
            let config = EngineConfig::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Reset => {
            let config = EngineConfig::default();
            config.save()?;
            println!("configuration reset to defaults");
        }
    }
    Ok(())
}
