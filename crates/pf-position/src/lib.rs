//! Position lifecycle management.
//!
//! Provides:
//! - `PositionManager`: one position per instrument, `Flat -> PendingEntry
//!   -> Open -> Flat`, stop/target/breakeven/trail exit management
//! - Reconciliation against the venue's position report
//! - Crash recovery as a pure fold over the event log
//! - `Flattener` for shutdown flattening
//! - `ExecutionVenue`: the broker seam, with `MockVenue` for tests

pub mod error;
pub mod flatten;
pub mod manager;
pub mod position;
pub mod reconcile;
pub mod recovery;
pub mod venue;

pub use error::{PositionError, PositionResult};
pub use flatten::{FlattenReason, FlattenRequest, FlattenState, Flattener, FLATTEN_GRACE_SECS};
pub use manager::{PositionManager, PositionState};
pub use position::{ClosedTrade, ExitConfig, ExitReason, Position, StopUpdate};
pub use reconcile::ReconcileOutcome;
pub use recovery::{
    recover_from_events, DailyTradeStats, RecoveredPosition, RecoveredState, TradeOutcome,
};
pub use venue::{
    BoxFuture, DynVenue, ExecutionVenue, MockVenue, OrderStatus, VenueError, VenueEvent,
    VenuePosition, VenueResult,
};
