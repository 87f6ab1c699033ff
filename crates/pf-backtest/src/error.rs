//! Backtest error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Risk(#[from] pf_risk::RiskError),

    #[error(transparent)]
    Position(#[from] pf_position::PositionError),

    #[error(transparent)]
    Core(#[from] pf_core::CoreError),
}

/// `BacktestResult` names the run output, so the alias is `EngineResult`.
pub type EngineResult<T> = Result<T, BacktestError>;
