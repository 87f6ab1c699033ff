//! Structured logging initialization.
//!
//! One global `tracing` subscriber per process. Every instrument worker
//! runs inside a `worker` span carrying the instrument symbol, so JSON
//! output can be filtered per instrument without each event repeating it.

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{TelemetryError, TelemetryResult};

const DEFAULT_FILTER: &str = "info,pf=debug";

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON when `RUST_ENV=production`, pretty otherwise.
    #[default]
    Auto,
    Json,
    Pretty,
}

impl LogFormat {
    /// Resolve `Auto` against the value of `RUST_ENV`.
    pub fn resolve(self, rust_env: Option<&str>) -> LogFormat {
        match self {
            LogFormat::Auto if rust_env == Some("production") => LogFormat::Json,
            LogFormat::Auto => LogFormat::Pretty,
            explicit => explicit,
        }
    }
}

/// `[logging]` section of the application config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directives; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,
}

impl LoggingConfig {
    /// Reject filter directives `tracing_subscriber` cannot parse.
    pub fn validate(&self) -> TelemetryResult<()> {
        if let Some(filter) = &self.filter {
            EnvFilter::try_new(filter)
                .map_err(|e| TelemetryError::LoggingInit(format!("bad filter {filter:?}: {e}")))?;
        }
        Ok(())
    }

    fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = self.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::LoggingInit(e.to_string()))
    }
}

/// Initialize logging with defaults (`RUST_LOG`, else `info,pf=debug`).
pub fn init_logging() -> TelemetryResult<()> {
    init_logging_with(&LoggingConfig::default())
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging_with(config: &LoggingConfig) -> TelemetryResult<()> {
    let env_filter = config.env_filter()?;
    let rust_env = std::env::var("RUST_ENV").ok();

    let result = match config.format.resolve(rust_env.as_deref()) {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true).with_thread_names(true))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Span an instrument worker runs in.
pub fn worker_span(instrument: &str) -> Span {
    tracing::info_span!("worker", instrument = %instrument)
}
