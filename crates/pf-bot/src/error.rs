//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] pf_core::CoreError),

    #[error("Risk error: {0}")]
    Risk(#[from] pf_risk::RiskError),

    #[error("Position error: {0}")]
    Position(#[from] pf_position::PositionError),

    #[error("Venue error: {0}")]
    Venue(#[from] pf_position::VenueError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] pf_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pf_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker for {0} stopped unexpectedly")]
    WorkerStopped(String),
}

pub type AppResult<T> = Result<T, AppError>;
