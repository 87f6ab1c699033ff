//! Risk error types.
//!
//! Rule rejections are not errors; they come back as `TradeDecision`.
//! These variants cover broken configuration only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Core(#[from] pf_core::CoreError),
}

pub type RiskResult<T> = Result<T, RiskError>;
