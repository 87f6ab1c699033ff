//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid position state: {0}")]
    InvalidState(String),

    /// The venue reports exposure the manager cannot account for.
    #[error("Unreconciled position for {instrument}: local {local}, venue {venue}")]
    Unreconciled {
        instrument: String,
        local: String,
        venue: String,
    },

    #[error(transparent)]
    Core(#[from] pf_core::CoreError),
}

pub type PositionResult<T> = Result<T, PositionError>;
