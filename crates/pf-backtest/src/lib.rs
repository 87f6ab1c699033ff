//! Backtest replay engine.
//!
//! Drives the risk gate and position manager bar by bar over historical
//! data, producing a trade ledger, an equity curve and a rejection
//! histogram. Metrics are derived from the ledger on demand.

pub mod config;
pub mod engine;
pub mod error;
pub mod result;
pub mod scripted;

pub use config::{BacktestConfig, REJECTION_KEY_LEN};
pub use engine::BacktestEngine;
pub use error::{BacktestError, EngineResult};
pub use result::{max_drawdown, BacktestResult, BacktestSummary, BacktestTrade, EquityPoint};
pub use scripted::ScriptedSignals;
