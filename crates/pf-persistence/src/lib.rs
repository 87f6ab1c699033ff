//! Append-only event log.
//!
//! One JSON Lines file per instrument per venue trading day. The log is
//! both the human audit trail and the input to crash recovery, so the
//! reader tolerates a torn last line or an odd corrupt record.

pub mod error;
pub mod event;
pub mod reader;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use event::{EventRecord, TradeEvent};
pub use reader::{log_dates, read_events, read_history};
pub use writer::{log_path, EventLogWriter};
