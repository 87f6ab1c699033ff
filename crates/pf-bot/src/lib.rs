//! Live trading runtime.
//!
//! One `InstrumentWorker` per instrument owns that instrument's risk gate,
//! position manager and event log. All of its inputs are serialized through
//! one queue:
//! - Bar polls on a timer, followed by exit management and entry checks
//! - Reconcile ticks against the venue's position report
//! - Venue callbacks (fills, order status, connection changes)
//! - Shutdown, which flattens and closes the log
//!
//! Startup replays today's event log before the first tick.

pub mod app;
pub mod config;
pub mod error;
pub mod status;
pub mod worker;

pub use app::{Application, RunningApp};
pub use config::{AppConfig, PersistenceConfig, RuntimeConfig};
pub use error::{AppError, AppResult};
pub use status::{new_status_board, InstrumentStatus, PositionSnapshot, StatusBoard};
pub use worker::{InstrumentWorker, WorkerMsg, WORKER_QUEUE_CAPACITY};
