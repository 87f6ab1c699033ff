//! Per-instrument status snapshots for dashboards.
//!
//! Each worker writes only its own key; readers take point-in-time clones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pf_core::{Direction, Price};
use pf_position::Position;
use pf_risk::GateStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Shared map of instrument symbol to its latest status.
pub type StatusBoard = Arc<DashMap<String, InstrumentStatus>>;

pub fn new_status_board() -> StatusBoard {
    Arc::new(DashMap::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub direction: Direction,
    pub contracts: u32,
    pub entry_price: Price,
    pub stop: Price,
    pub target: Price,
    pub entry_time: DateTime<Utc>,
    pub entry_confirmed: bool,
    pub breakeven_armed: bool,
}

impl From<&Position> for PositionSnapshot {
    fn from(p: &Position) -> Self {
        Self {
            direction: p.direction,
            contracts: p.contracts,
            entry_price: p.entry_price,
            stop: p.stop,
            target: p.target,
            entry_time: p.entry_time,
            entry_confirmed: p.entry_confirmed,
            breakeven_armed: p.breakeven_armed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentStatus {
    pub instrument: String,
    /// `flat`, `pending_entry` or `open`.
    pub state: String,
    pub position: Option<PositionSnapshot>,
    pub gate: GateStatus,
    pub balance: Decimal,
    pub realized_pnl_today: Decimal,
    pub last_bar_at: Option<DateTime<Utc>>,
    pub last_reconcile_at: Option<DateTime<Utc>>,
    pub venue_connected: bool,
    /// Set while venue requests are paused after a retryable failure.
    pub backoff_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl InstrumentStatus {
    pub fn can_trade(&self) -> bool {
        self.gate.breakers.can_trade && self.backoff_until.is_none() && self.venue_connected
    }
}
