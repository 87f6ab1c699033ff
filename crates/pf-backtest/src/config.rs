//! Backtest configuration.

use pf_position::ExitConfig;
use pf_risk::RiskConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, EngineResult};

/// Rejection reasons are bucketed by this many leading characters.
pub const REJECTION_KEY_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    /// Bars of history required before the first entry check.
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,
    /// Minimum signal confidence passed to the generator.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_warmup_bars() -> usize {
    20
}

fn default_min_confidence() -> f64 {
    0.5
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            exit: ExitConfig::default(),
            warmup_bars: default_warmup_bars(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> EngineResult<()> {
        self.risk.validate()?;
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(BacktestError::Config(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml_like_json() {
        let config: BacktestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BacktestConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_confidence() {
        let config = BacktestConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BacktestError::Config(_))));
    }
}
