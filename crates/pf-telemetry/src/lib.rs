//! Prometheus metrics and structured logging.
//!
//! - `init_logging_with`: `tracing` subscriber, JSON in production
//! - `worker_span`: per-instrument span for worker tasks
//! - `Metrics`: facade over the process-wide Prometheus registry

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, worker_span, LogFormat, LoggingConfig};
pub use metrics::Metrics;
