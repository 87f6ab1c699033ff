//! Error types for pf-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
