//! Risk configuration.
//!
//! Thresholds are fixed business rules for one funding-program archetype.
//! The defaults are the reference configuration; TOML files override them
//! field by field.

use pf_core::{AccountMode, VenueClock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::breakers::{ConsistencyConfig, CooldownConfig, InactivityConfig, MarketHoursConfig};
use crate::error::{RiskError, RiskResult};

/// One step of the risk-multiplier ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    /// Tier applies when buffer-remaining ratio is at least this value.
    pub min_remaining_ratio: Decimal,
    /// Fraction of the remaining buffer that may be risked on one trade.
    pub multiplier: Decimal,
}

impl RiskTier {
    pub const fn new(min_remaining_ratio: Decimal, multiplier: Decimal) -> Self {
        Self {
            min_remaining_ratio,
            multiplier,
        }
    }
}

/// Per-mode threshold table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRules {
    /// Descending tiers. The last tier applies below every threshold.
    pub risk_tiers: Vec<RiskTier>,
    /// Fixed per-mode contract ceiling.
    pub max_contracts_by_rule: u32,
    /// Maximum calendar days without a trade.
    pub max_idle_days: i64,
}

impl ModeRules {
    pub fn challenge() -> Self {
        Self {
            risk_tiers: vec![
                RiskTier::new(Decimal::new(75, 2), Decimal::new(50, 2)),
                RiskTier::new(Decimal::new(50, 2), Decimal::new(40, 2)),
                RiskTier::new(Decimal::new(25, 2), Decimal::new(30, 2)),
                RiskTier::new(Decimal::ZERO, Decimal::new(20, 2)),
            ],
            max_contracts_by_rule: 20,
            max_idle_days: 7,
        }
    }

    pub fn funded() -> Self {
        Self {
            risk_tiers: vec![
                RiskTier::new(Decimal::new(75, 2), Decimal::new(40, 2)),
                RiskTier::new(Decimal::new(50, 2), Decimal::new(30, 2)),
                RiskTier::new(Decimal::new(25, 2), Decimal::new(20, 2)),
                RiskTier::new(Decimal::ZERO, Decimal::new(10, 2)),
            ],
            max_contracts_by_rule: 30,
            max_idle_days: 30,
        }
    }
}

/// Risk configuration for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub mode: AccountMode,
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
    /// Fixed total-loss cap (Challenge / FundedPrePayout).
    #[serde(default = "default_total_loss_cap")]
    pub total_loss_cap: Decimal,
    /// Hard balance floor (FundedPostPayout).
    #[serde(default = "default_post_payout_floor")]
    pub post_payout_floor: Decimal,
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: Decimal,
    /// Share of balance that may be tied up as margin.
    #[serde(default = "default_margin_utilization_cap")]
    pub margin_utilization_cap: Decimal,
    /// Hard per-trade contract ceiling.
    #[serde(default = "default_max_contracts_per_trade")]
    pub max_contracts_per_trade: u32,
    /// Reject when one contract risks more than this share of the buffer.
    #[serde(default = "default_max_single_contract_buffer_fraction")]
    pub max_single_contract_buffer_fraction: Decimal,
    #[serde(default = "default_min_reward_risk")]
    pub min_reward_risk: Decimal,
    /// IANA timezone of the venue.
    #[serde(default = "default_venue_timezone")]
    pub venue_timezone: String,
    #[serde(default = "ModeRules::challenge")]
    pub challenge_rules: ModeRules,
    #[serde(default = "ModeRules::funded")]
    pub funded_rules: ModeRules,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
    #[serde(default)]
    pub market_hours: MarketHoursConfig,
    #[serde(default)]
    pub inactivity: InactivityConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
}

fn default_starting_balance() -> Decimal {
    Decimal::from(25_000)
}

fn default_total_loss_cap() -> Decimal {
    Decimal::from(2_500)
}

fn default_post_payout_floor() -> Decimal {
    Decimal::from(25_100)
}

fn default_daily_loss_limit() -> Decimal {
    Decimal::from(1_250)
}

fn default_margin_utilization_cap() -> Decimal {
    Decimal::new(5, 1)
}

fn default_max_contracts_per_trade() -> u32 {
    1
}

fn default_max_single_contract_buffer_fraction() -> Decimal {
    Decimal::new(4, 1)
}

fn default_min_reward_risk() -> Decimal {
    Decimal::new(8, 1)
}

fn default_venue_timezone() -> String {
    "America/New_York".to_string()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            mode: AccountMode::default(),
            starting_balance: default_starting_balance(),
            total_loss_cap: default_total_loss_cap(),
            post_payout_floor: default_post_payout_floor(),
            daily_loss_limit: default_daily_loss_limit(),
            margin_utilization_cap: default_margin_utilization_cap(),
            max_contracts_per_trade: default_max_contracts_per_trade(),
            max_single_contract_buffer_fraction: default_max_single_contract_buffer_fraction(),
            min_reward_risk: default_min_reward_risk(),
            venue_timezone: default_venue_timezone(),
            challenge_rules: ModeRules::challenge(),
            funded_rules: ModeRules::funded(),
            consistency: ConsistencyConfig::default(),
            market_hours: MarketHoursConfig::default(),
            inactivity: InactivityConfig::default(),
            cooldown: CooldownConfig::default(),
        }
    }
}

impl RiskConfig {
    /// Reference configuration for the given mode.
    pub fn for_mode(mode: AccountMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Threshold table for the configured mode.
    pub fn rules(&self) -> &ModeRules {
        self.rules_for(self.mode)
    }

    pub fn rules_for(&self, mode: AccountMode) -> &ModeRules {
        if mode.is_funded() {
            &self.funded_rules
        } else {
            &self.challenge_rules
        }
    }

    /// The "hard cap" argument of the total-loss rule for this mode.
    pub fn hard_cap(&self) -> Decimal {
        match self.mode {
            AccountMode::FundedPostPayout => self.post_payout_floor,
            _ => self.total_loss_cap,
        }
    }

    pub fn venue_clock(&self) -> RiskResult<VenueClock> {
        VenueClock::from_name(&self.venue_timezone).ok_or_else(|| {
            RiskError::ConfigError(format!("unknown venue timezone: {}", self.venue_timezone))
        })
    }

    pub fn validate(&self) -> RiskResult<()> {
        self.venue_clock()?;
        if self.starting_balance <= Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "starting_balance must be positive".to_string(),
            ));
        }
        if self.daily_loss_limit <= Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "daily_loss_limit must be positive".to_string(),
            ));
        }
        if self.max_contracts_per_trade == 0 {
            return Err(RiskError::ConfigError(
                "max_contracts_per_trade must be at least 1".to_string(),
            ));
        }
        for (label, rules) in [("challenge", &self.challenge_rules), ("funded", &self.funded_rules)] {
            if rules.risk_tiers.is_empty() {
                return Err(RiskError::ConfigError(format!("{label}: risk_tiers is empty")));
            }
            let descending = rules
                .risk_tiers
                .windows(2)
                .all(|w| w[0].min_remaining_ratio > w[1].min_remaining_ratio);
            if !descending {
                return Err(RiskError::ConfigError(format!(
                    "{label}: risk tiers must be ordered by descending threshold"
                )));
            }
        }
        self.market_hours.validate()?;
        Ok(())
    }

    /// Idle-day limit for the configured mode, unless overridden.
    pub fn max_idle_days(&self) -> i64 {
        self.inactivity
            .max_idle_days
            .unwrap_or_else(|| self.rules().max_idle_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RiskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rules().max_contracts_by_rule, 20);
        assert_eq!(config.hard_cap(), Decimal::from(2_500));
    }

    #[test]
    fn test_post_payout_hard_cap_is_floor() {
        let config = RiskConfig::for_mode(AccountMode::FundedPostPayout);
        assert_eq!(config.hard_cap(), Decimal::from(25_100));
        assert_eq!(config.rules().max_contracts_by_rule, 30);
        assert_eq!(config.max_idle_days(), 30);
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let config = RiskConfig {
            venue_timezone: "Nowhere/Land".to_string(),
            ..RiskConfig::default()
        };
        assert!(matches!(config.validate(), Err(RiskError::ConfigError(_))));
    }

    #[test]
    fn test_unordered_tiers_rejected() {
        let mut config = RiskConfig::default();
        config.challenge_rules.risk_tiers.reverse();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_like_json_uses_defaults() {
        let config: RiskConfig = serde_json::from_str(r#"{"mode":"funded_pre_payout"}"#).unwrap();
        assert_eq!(config.mode, AccountMode::FundedPrePayout);
        assert_eq!(config.daily_loss_limit, Decimal::from(1_250));
        assert_eq!(config.max_idle_days(), 30);
    }
}
