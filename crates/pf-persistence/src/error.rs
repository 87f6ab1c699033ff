//! Persistence error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The day's log file could not be opened.
    #[error("Cannot open event log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
