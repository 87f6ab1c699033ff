//! Crash recovery from the event log.
//!
//! `recover_from_events` is a pure fold over an instrument's ordered event
//! records, possibly spanning several days. It yields today's closed-trade
//! statistics, the outcomes of earlier days, and the position that was
//! still open (or pending) when the log ended. The log alone cannot
//! prove that position still exists, so `restore` marks the manager as
//! needing a reconcile before it trades again.

use chrono::{DateTime, NaiveDate, Utc};
use pf_core::{BracketIds, ClientOrderId, OrderRole, Price, TradeSetup, VenueClock};
use pf_persistence::{EventRecord, TradeEvent};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PositionError, PositionResult};
use crate::manager::{PositionManager, PositionState};
use crate::position::Position;

/// One realized trade outcome, for replaying into the breakers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub at: DateTime<Utc>,
    pub pnl: Decimal,
    pub reason: String,
}

/// Aggregate of today's closed trades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTradeStats {
    pub date: NaiveDate,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub realized_pnl: Decimal,
    /// Sum of losing trades' magnitudes.
    pub gross_loss: Decimal,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<TradeOutcome>,
}

impl DailyTradeStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trades: 0,
            wins: 0,
            losses: 0,
            realized_pnl: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            last_trade_at: None,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, at: DateTime<Utc>, pnl: Decimal, reason: &str) {
        self.trades += 1;
        if pnl > Decimal::ZERO {
            self.wins += 1;
        } else if pnl < Decimal::ZERO {
            self.losses += 1;
            self.gross_loss += -pnl;
        }
        self.realized_pnl += pnl;
        self.last_trade_at = Some(at);
        self.outcomes.push(TradeOutcome {
            at,
            pnl,
            reason: reason.to_string(),
        });
    }
}

/// A position reconstructed from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredPosition {
    pub setup: TradeSetup,
    pub contracts: u32,
    /// Fill price once confirmed, planned entry otherwise.
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub stop: Price,
    pub orders: BracketIds,
    pub entry_confirmed: bool,
    pub breakeven_armed: bool,
}

/// Output of the recovery fold.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredState {
    pub stats: DailyTradeStats,
    /// Exits on venue days before today, oldest first.
    pub prior_outcomes: Vec<TradeOutcome>,
    pub position: Option<RecoveredPosition>,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub events_applied: usize,
}

/// Fold an instrument's event records, oldest first.
///
/// - An approved `Signal` opens a candidate position
/// - `OrderSubmitted` attaches order ids to it
/// - An entry `Fill` confirms it at the fill price
/// - `StopUpdate` moves its stop
/// - `Exit` closes it; exits on `today` (venue date) count toward the
///   stats, earlier ones go to `prior_outcomes`
///
/// Records for other instruments are ignored.
pub fn recover_from_events(
    instrument: &str,
    events: &[EventRecord],
    today: NaiveDate,
    clock: &VenueClock,
) -> RecoveredState {
    let mut stats = DailyTradeStats::new(today);
    let mut prior_outcomes = Vec::new();
    let mut open: Option<RecoveredPosition> = None;
    let mut first_event_at = None;
    let mut last_event_at = None;
    let mut applied = 0usize;

    for record in events.iter().filter(|r| r.instrument == instrument) {
        applied += 1;
        first_event_at.get_or_insert(record.timestamp);
        last_event_at = Some(record.timestamp);

        match &record.event {
            TradeEvent::Signal {
                setup,
                approved: true,
                contracts,
                ..
            } if *contracts > 0 => {
                if let Some(prev) = open.as_ref().filter(|p| p.entry_confirmed) {
                    warn!(
                        instrument,
                        prev_entry = %prev.entry_price,
                        "Approved signal while a confirmed position was open; keeping the open one"
                    );
                    continue;
                }
                open = Some(RecoveredPosition {
                    setup: setup.clone(),
                    contracts: *contracts,
                    entry_price: setup.entry,
                    entry_time: record.timestamp,
                    stop: setup.stop,
                    orders: BracketIds::default(),
                    entry_confirmed: false,
                    breakeven_armed: false,
                });
            }
            TradeEvent::OrderSubmitted { order_id, role, .. } => {
                if let Some(pos) = open.as_mut() {
                    pos.orders.set(*role, order_id.clone());
                }
            }
            TradeEvent::Fill {
                order_id,
                role: OrderRole::Entry,
                price,
                contracts,
            } => {
                if let Some(pos) = open.as_mut() {
                    if !matches_entry(&pos.orders, order_id) {
                        warn!(instrument, %order_id, "Entry fill for an unknown order");
                    }
                    pos.entry_price = *price;
                    pos.entry_time = record.timestamp;
                    pos.contracts = *contracts;
                    pos.entry_confirmed = true;
                }
            }
            TradeEvent::StopUpdate { new_stop, reason, .. } => {
                if let Some(pos) = open.as_mut() {
                    pos.stop = *new_stop;
                    if reason == "breakeven" || *new_stop == pos.entry_price {
                        pos.breakeven_armed = true;
                    }
                }
            }
            TradeEvent::Exit { pnl, reason, .. } => {
                open = None;
                let date = clock.venue_date(record.timestamp);
                if date == today {
                    stats.record(record.timestamp, *pnl, reason);
                } else if date < today {
                    prior_outcomes.push(TradeOutcome {
                        at: record.timestamp,
                        pnl: *pnl,
                        reason: reason.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    RecoveredState {
        stats,
        prior_outcomes,
        position: open,
        first_event_at,
        last_event_at,
        events_applied: applied,
    }
}

fn matches_entry(orders: &BracketIds, order_id: &ClientOrderId) -> bool {
    orders.entry.as_ref().map_or(true, |id| id == order_id)
}

impl PositionManager {
    /// Reinstate a recovered position and require a reconcile.
    ///
    /// A confirmed entry comes back `Open`, an unconfirmed one
    /// `PendingEntry`. Nothing to restore still requires the reconcile: the
    /// venue may hold exposure the log never saw.
    pub fn restore(&mut self, recovered: &RecoveredState, bar_index: usize) -> PositionResult<()> {
        if !self.is_flat() {
            return Err(PositionError::InvalidState(format!(
                "{}: restore requested while {}",
                self.instrument(),
                self.state().label()
            )));
        }

        if let Some(rec) = &recovered.position {
            rec.setup.validate()?;
            let mut position = Position::from_setup(
                &rec.setup,
                self.spec(),
                rec.contracts,
                rec.orders.clone(),
                rec.entry_time,
                bar_index,
            );
            position.entry_price = rec.entry_price;
            position.stop = rec.stop;
            position.entry_confirmed = rec.entry_confirmed;
            position.breakeven_armed = rec.breakeven_armed;

            info!(
                instrument = %self.instrument(),
                position = %position.describe(),
                confirmed = rec.entry_confirmed,
                stop = %position.stop,
                "Restored position from event log"
            );
            let state = if rec.entry_confirmed {
                PositionState::Open(position)
            } else {
                PositionState::PendingEntry(position)
            };
            self.set_state(state);
        }

        self.set_needs_reconcile(true);
        Ok(())
    }
}
