//! TOML-based engine configuration.
//!
//! Product constants -- reminder lead window, missed grace window, snooze
//! duration, coin values, milestones, symbol weights and the prize table --
//! are configuration, not code. Stored at `~/.config/dosewise/config.toml`
//! and loaded once per process; every field has a default so a missing or
//! partial file still yields a working engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::rewards::{BadgeType, Prize, SlotSymbol};
use crate::rewards::slot::{SymbolWeight, TriplePrize};
use crate::storage::data_dir;

/// Reminder sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Closest a reminder may fire before the dose, in minutes.
    #[serde(default = "default_lead_min")]
    pub lead_min_minutes: i64,
    /// Furthest a reminder may fire before the dose, in minutes.
    #[serde(default = "default_lead_max")]
    pub lead_max_minutes: i64,
}

/// Missed-dose grace window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraceConfig {
    /// A pending dose becomes missed this many minutes after its instant.
    #[serde(default = "default_grace")]
    pub missed_after_minutes: i64,
    /// The sweep stops looking at doses older than this, in minutes.
    #[serde(default = "default_cutoff")]
    pub missed_cutoff_minutes: i64,
}

/// Reward economy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Base coins for an on-time taken dose.
    #[serde(default = "default_on_time_coins")]
    pub on_time_coins: i64,
    /// Extra coins when the dose was early (within 5 minutes).
    #[serde(default = "default_early_bonus")]
    pub early_bonus_coins: i64,
    /// Base coins for a late taken dose.
    #[serde(default = "default_late_coins")]
    pub late_coins: i64,
    /// Spins granted per on-time dose.
    #[serde(default = "default_one")]
    pub spins_per_on_time_dose: i64,
    /// Multiplier added per on-time dose, capped at 3.0.
    #[serde(default = "default_multiplier_step")]
    pub multiplier_step: f64,
    /// Coins for a pair spin.
    #[serde(default = "default_pair_coins")]
    pub pair_coins: i64,
    /// Consolation coins for a miss spin.
    #[serde(default = "default_consolation_coins")]
    pub consolation_coins: i64,
    /// Ascending coin milestones.
    #[serde(default = "default_milestones")]
    pub milestones: Vec<i64>,
    /// Shield duration granted by a shield prize.
    #[serde(default = "default_shield_hours")]
    pub shield_hours: i64,
    /// Double-coins boost duration.
    #[serde(default = "default_double_coins_hours")]
    pub double_coins_hours: i64,
    /// Slot symbol weight table.
    #[serde(default = "default_symbol_weights")]
    pub symbol_weights: Vec<SymbolWeight>,
    /// Three-of-a-kind prize table.
    #[serde(default = "default_triple_prizes")]
    pub triple_prizes: Vec<TriplePrize>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Snooze duration in minutes.
    #[serde(default = "default_snooze")]
    pub snooze_minutes: i64,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub grace: GraceConfig,
    #[serde(default)]
    pub rewards: RewardConfig,
}

fn default_snooze() -> i64 {
    10
}
fn default_lead_min() -> i64 {
    5
}
fn default_lead_max() -> i64 {
    15
}
fn default_grace() -> i64 {
    30
}
fn default_cutoff() -> i64 {
    120
}
fn default_on_time_coins() -> i64 {
    10
}
fn default_early_bonus() -> i64 {
    5
}
fn default_late_coins() -> i64 {
    5
}
fn default_one() -> i64 {
    1
}
fn default_multiplier_step() -> f64 {
    0.1
}
fn default_pair_coins() -> i64 {
    15
}
fn default_consolation_coins() -> i64 {
    5
}
fn default_milestones() -> Vec<i64> {
    vec![100, 500, 1000, 5000, 10_000]
}
fn default_shield_hours() -> i64 {
    24
}
fn default_double_coins_hours() -> i64 {
    24
}

fn default_symbol_weights() -> Vec<SymbolWeight> {
    vec![
        SymbolWeight { symbol: SlotSymbol::Pill, weight: 30 },
        SymbolWeight { symbol: SlotSymbol::Heart, weight: 25 },
        SymbolWeight { symbol: SlotSymbol::Star, weight: 20 },
        SymbolWeight { symbol: SlotSymbol::Clover, weight: 15 },
        SymbolWeight { symbol: SlotSymbol::Gem, weight: 7 },
        SymbolWeight { symbol: SlotSymbol::Crown, weight: 3 },
    ]
}

fn default_triple_prizes() -> Vec<TriplePrize> {
    vec![
        TriplePrize {
            symbol: SlotSymbol::Pill,
            prize: Prize::Coins { amount: 50 },
        },
        TriplePrize {
            symbol: SlotSymbol::Heart,
            prize: Prize::Multiplier { amount: 0.5 },
        },
        TriplePrize {
            symbol: SlotSymbol::Star,
            prize: Prize::BonusSpins { count: 2 },
        },
        TriplePrize {
            symbol: SlotSymbol::Clover,
            prize: Prize::Shield { hours: 24 },
        },
        TriplePrize {
            symbol: SlotSymbol::Gem,
            prize: Prize::Badge {
                badge: BadgeType::LuckyGem,
            },
        },
        TriplePrize {
            symbol: SlotSymbol::Crown,
            prize: Prize::Jackpot { amount: 500 },
        },
    ]
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead_min_minutes: default_lead_min(),
            lead_max_minutes: default_lead_max(),
        }
    }
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            missed_after_minutes: default_grace(),
            missed_cutoff_minutes: default_cutoff(),
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            on_time_coins: default_on_time_coins(),
            early_bonus_coins: default_early_bonus(),
            late_coins: default_late_coins(),
            spins_per_on_time_dose: default_one(),
            multiplier_step: default_multiplier_step(),
            pair_coins: default_pair_coins(),
            consolation_coins: default_consolation_coins(),
            milestones: default_milestones(),
            shield_hours: default_shield_hours(),
            double_coins_hours: default_double_coins_hours(),
            symbol_weights: default_symbol_weights(),
            triple_prizes: default_triple_prizes(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snooze_minutes: default_snooze(),
            reminder: ReminderConfig::default(),
            grace: GraceConfig::default(),
            rewards: RewardConfig::default(),
        }
    }
}

impl EngineConfig {
    fn config_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load configuration from the data dir, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::Custom(format!("read {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| EngineError::Custom(format!("parse config: {e}")))
    }

    /// Persist configuration to the data dir.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let raw = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Custom(format!("serialize config: {e}")))?;
        std::fs::write(&path, raw)
            .map_err(|e| EngineError::Custom(format!("write {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.snooze_minutes, 10);
        assert_eq!(cfg.reminder.lead_min_minutes, 5);
        assert_eq!(cfg.reminder.lead_max_minutes, 15);
        assert_eq!(cfg.grace.missed_after_minutes, 30);
        assert_eq!(cfg.grace.missed_cutoff_minutes, 120);
        assert!(cfg.rewards.milestones.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(cfg.rewards.symbol_weights.len(), 6);
        assert_eq!(cfg.rewards.triple_prizes.len(), 6);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: EngineConfig = toml::from_str(
            "snooze_minutes = 15\n\n[reminder]\nlead_min_minutes = 2\n",
        )
        .unwrap();
        assert_eq!(cfg.snooze_minutes, 15);
        assert_eq!(cfg.reminder.lead_min_minutes, 2);
        assert_eq!(cfg.reminder.lead_max_minutes, 15);
        assert_eq!(cfg.grace.missed_after_minutes, 30);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let raw = toml::to_string_pretty(&cfg).unwrap();
        let decoded: EngineConfig = toml::from_str(&raw).unwrap();
        assert_eq!(decoded.rewards.triple_prizes.len(), cfg.rewards.triple_prizes.len());
    }
}
