use chrono::Utc;
use clap::Subcommand;

use super::{open_engine, CliResult};

#[derive(Subcommand)]
pub enum AccountAction {
    /// Show coins, spins, streak, and badges
    Show {
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List held items
    Inventory {
        user: String,
    },
    /// Equip a cosmetic item
    Equip {
        user: String,
        item: String,
    },
}

pub fn run(action: AccountAction) -> CliResult {
    let engine = open_engine()?;
    let now = Utc::now();
    match action {
        AccountAction::Show { user, json } => {
            let account = engine.account(&user, now)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
                return Ok(());
            }
            println!("coins: {}", account.coins);
            println!("spins: {}", account.available_spins);
            println!(
                "streak: {} days (x{:.1})",
                account.streak_days, account.streak_multiplier
            );
            if let Some(expires) = account.shield_expires_at {
                if expires > now {
                    println!("shield until: {}", expires.to_rfc3339());
                }
            }
            let badges = engine.rewards().store().badges_for(&user)?;
            if !badges.is_empty() {
                println!("badges: {}", badges.join(", "));
            }
        }
        AccountAction::Inventory { user } => {
            for item in engine.rewards().store().inventory_for(&user)? {
                let mut line = format!("{}  ({})", item.item_id, item.category);
                if item.equipped {
                    line.push_str("  equipped");
                }
                if let Some(expires) = item.expires_at {
                    line.push_str(&format!("  until {}", expires.to_rfc3339()));
                }
                println!("{line}");
            }
        }
        AccountAction::Equip { user, item } => {
            engine.rewards().store().equip_item(&user, &item)?;
            println!("equipped {item}");
        }
    }
    Ok(())
}
