//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pf_core::{InstrumentBook, InstrumentSpec};
use pf_position::{ExitConfig, FLATTEN_GRACE_SECS};
use pf_risk::RiskConfig;
use pf_telemetry::LoggingConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Worker timing and decision settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Bar poll interval (s). Default: 90.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Reconciliation interval (s). Default: 60.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Back-off after a retryable venue failure (s). Default: 300.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    /// Upper bound on any single venue request (s). Default: 15.
    #[serde(default = "default_venue_timeout_secs")]
    pub venue_timeout_secs: u64,
    /// How long shutdown waits for the flatten fill (s). Default: 30.
    #[serde(default = "default_flatten_grace_secs")]
    pub flatten_grace_secs: u64,
    /// Bars kept in memory for the signal generator. Default: 500.
    #[serde(default = "default_bar_history")]
    pub bar_history: usize,
    /// Bars required before the first entry check. Default: 20.
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,
    /// Minimum signal confidence. Default: 0.5.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Account balance before the first trade in the event log. Defaults
    /// to the risk config's starting balance.
    #[serde(default)]
    pub current_balance: Option<Decimal>,
}

fn default_poll_interval_secs() -> u64 {
    90
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_backoff_secs() -> u64 {
    300
}

fn default_venue_timeout_secs() -> u64 {
    15
}

fn default_flatten_grace_secs() -> u64 {
    FLATTEN_GRACE_SECS as u64
}

fn default_bar_history() -> usize {
    500
}

fn default_warmup_bars() -> usize {
    20
}

fn default_min_confidence() -> f64 {
    0.5
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            backoff_secs: default_backoff_secs(),
            venue_timeout_secs: default_venue_timeout_secs(),
            flatten_grace_secs: default_flatten_grace_secs(),
            bar_history: default_bar_history(),
            warmup_bars: default_warmup_bars(),
            min_confidence: default_min_confidence(),
            current_balance: None,
        }
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn backoff(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.backoff_secs as i64)
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_secs(self.venue_timeout_secs)
    }

    pub fn flatten_grace(&self) -> Duration {
        Duration::from_secs(self.flatten_grace_secs)
    }
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Base directory for per-instrument, per-day JSONL files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Records buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./data/events")
}

fn default_buffer_size() -> usize {
    32
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Symbols to trade. Each must resolve in the instrument book.
    pub instruments: Vec<String>,
    /// Extra or overriding contract specs, merged over the reference book.
    #[serde(default)]
    pub specs: Vec<InstrumentSpec>,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reference specs with configured overrides applied.
    pub fn instrument_book(&self) -> InstrumentBook {
        let mut book = InstrumentBook::reference();
        for spec in &self.specs {
            book.insert(spec.clone());
        }
        book
    }

    pub fn starting_balance(&self) -> Decimal {
        self.runtime
            .current_balance
            .unwrap_or(self.risk.starting_balance)
    }

    /// Unknown instruments and zero intervals are fatal.
    pub fn validate(&self) -> AppResult<()> {
        if self.instruments.is_empty() {
            return Err(AppError::Config("no instruments configured".to_string()));
        }
        let book = self.instrument_book();
        book.validate()?;
        for symbol in &self.instruments {
            book.get(symbol)?;
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.instruments.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(AppError::Config(format!("instrument {dup} listed twice")));
        }

        let rt = &self.runtime;
        for (name, value) in [
            ("poll_interval_secs", rt.poll_interval_secs),
            ("reconcile_interval_secs", rt.reconcile_interval_secs),
            ("backoff_secs", rt.backoff_secs),
            ("venue_timeout_secs", rt.venue_timeout_secs),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("runtime.{name} must be positive")));
            }
        }
        if rt.bar_history < rt.warmup_bars.max(1) {
            return Err(AppError::Config(format!(
                "runtime.bar_history ({}) must cover warmup_bars ({})",
                rt.bar_history, rt.warmup_bars
            )));
        }
        if !(0.0..=1.0).contains(&rt.min_confidence) {
            return Err(AppError::Config(format!(
                "runtime.min_confidence must be in [0, 1], got {}",
                rt.min_confidence
            )));
        }

        self.risk.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::AccountMode;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minimal_config() {
        let config = AppConfig::from_toml_str(r#"instruments = ["MES", "MNQ"]"#).unwrap();
        assert_eq!(config.runtime.poll_interval_secs, 90);
        assert_eq!(config.runtime.reconcile_interval_secs, 60);
        assert_eq!(config.runtime.backoff_secs, 300);
        assert_eq!(config.runtime.flatten_grace_secs, 30);
        assert_eq!(config.starting_balance(), config.risk.starting_balance);
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            instruments = ["MES", "MCL"]

            [risk]
            mode = "funded_pre_payout"
            daily_loss_limit = "1000"

            [runtime]
            poll_interval_secs = 30
            current_balance = "50750"

            [persistence]
            log_dir = "/tmp/pf-events"
            buffer_size = 8

            [logging]
            format = "json"
            filter = "info,pf_bot=debug"

            [[specs]]
            symbol = "MES"
            point_value = "5"
            tick_size = "0.25"
            typical_margin = "2000"
            commission_round_trip = "1.24"
        "#;
        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.risk.mode, AccountMode::FundedPrePayout);
        assert_eq!(config.risk.daily_loss_limit, dec!(1000));
        assert_eq!(config.runtime.poll_interval_secs, 30);
        assert_eq!(config.starting_balance(), dec!(50750));
        assert_eq!(config.persistence.buffer_size, 8);
        assert_eq!(config.logging.format, pf_telemetry::LogFormat::Json);

        let book = config.instrument_book();
        assert_eq!(book.get("MES").unwrap().typical_margin, dec!(2000));
        assert!(book.contains("MCL"));
    }

    #[test]
    fn test_bad_log_filter_rejected() {
        let toml = r#"
            instruments = ["MES"]

            [logging]
            filter = "pf_bot=loud"
        "#;
        let err = AppConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, AppError::Telemetry(_)));
    }

    #[test]
    fn test_unknown_instrument_is_fatal() {
        let err = AppConfig::from_toml_str(r#"instruments = ["ZZZ"]"#).unwrap_err();
        assert!(matches!(err, AppError::Core(_)), "got {err:?}");
    }

    #[test]
    fn test_zero_interval_is_fatal() {
        let toml = r#"
            instruments = ["MES"]
            [runtime]
            reconcile_interval_secs = 0
        "#;
        let err = AppConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("reconcile_interval_secs"));
    }

    #[test]
    fn test_empty_and_duplicate_instruments_rejected() {
        assert!(AppConfig::from_toml_str("instruments = []").is_err());
        assert!(AppConfig::from_toml_str(r#"instruments = ["MES", "MES"]"#).is_err());
    }
}
