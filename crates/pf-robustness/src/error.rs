//! Robustness analysis error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RobustnessError {
    #[error("{analysis} needs at least one trade")]
    InsufficientTrades { analysis: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type RobustnessResult<T> = Result<T, RobustnessError>;

pub(crate) fn require_trades<T>(items: &[T], analysis: &'static str) -> RobustnessResult<()> {
    if items.is_empty() {
        return Err(RobustnessError::InsufficientTrades { analysis });
    }
    Ok(())
}
