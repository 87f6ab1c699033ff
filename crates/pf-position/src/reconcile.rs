//! Reconciliation against the venue's position report.
//!
//! The venue is the source of truth. Every divergence is corrected locally
//! and logged loudly; exposure the manager cannot explain is an error for
//! the operator rather than something to adopt silently.

use chrono::{DateTime, Utc};
use pf_core::{ClientOrderId, Price};
use tracing::{debug, error, info, warn};

use crate::error::{PositionError, PositionResult};
use crate::manager::{PositionManager, PositionState};
use crate::position::{ClosedTrade, ExitReason, Position};
use crate::venue::VenuePosition;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    InSync,
    /// A pending entry turned out to be filled.
    EntryConfirmed { fill_price: Price },
    /// Position kept, contract count taken from the venue.
    Corrected { reason: String },
    /// Venue is flat under a confirmed position: closed at the last price.
    SyntheticClose { trade: ClosedTrade },
    /// Venue is flat and the entry never filled: zero-P&L close, orders to
    /// cancel.
    PhantomCleared {
        trade: ClosedTrade,
        cancel: Vec<ClientOrderId>,
    },
}

impl ReconcileOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::EntryConfirmed { .. } => "entry_confirmed",
            Self::Corrected { .. } => "corrected",
            Self::SyntheticClose { .. } => "synthetic_close",
            Self::PhantomCleared { .. } => "phantom_cleared",
        }
    }

    pub fn is_correction(&self) -> bool {
        !matches!(self, Self::InSync)
    }

    pub fn closed_trade(&self) -> Option<&ClosedTrade> {
        match self {
            Self::SyntheticClose { trade } | Self::PhantomCleared { trade, .. } => Some(trade),
            _ => None,
        }
    }

    /// Human-readable reason for the event log.
    pub fn reason(&self) -> String {
        match self {
            Self::InSync => "in sync with venue".to_string(),
            Self::EntryConfirmed { fill_price } => {
                format!("venue holds the pending entry, confirmed at {fill_price}")
            }
            Self::Corrected { reason } => reason.clone(),
            Self::SyntheticClose { trade } => format!(
                "venue flat under confirmed position, closed at last price {} (pnl {})",
                trade.exit_price, trade.pnl
            ),
            Self::PhantomCleared { cancel, .. } => format!(
                "venue flat and entry never filled, cancelled {} order(s)",
                cancel.len()
            ),
        }
    }
}

impl PositionManager {
    /// Bring local state in line with the venue's report.
    ///
    /// `last_price` prices a synthetic close when the venue is flat under a
    /// confirmed position. Clears `needs_reconcile` on success.
    pub fn reconcile(
        &mut self,
        report: &VenuePosition,
        last_price: Price,
        now: DateTime<Utc>,
    ) -> PositionResult<ReconcileOutcome> {
        let outcome = self.reconcile_inner(report, last_price, now)?;
        self.set_needs_reconcile(false);

        match &outcome {
            ReconcileOutcome::InSync => {
                debug!(instrument = %self.instrument(), "Reconcile: in sync");
            }
            ReconcileOutcome::EntryConfirmed { .. } => {
                info!(instrument = %self.instrument(), reason = %outcome.reason(), "Reconcile");
            }
            _ => {
                warn!(
                    instrument = %self.instrument(),
                    kind = outcome.kind(),
                    reason = %outcome.reason(),
                    "Reconcile corrected local state"
                );
            }
        }
        Ok(outcome)
    }

    fn reconcile_inner(
        &mut self,
        report: &VenuePosition,
        last_price: Price,
        now: DateTime<Utc>,
    ) -> PositionResult<ReconcileOutcome> {
        match std::mem::take(self.state_mut()) {
            PositionState::Flat => {
                if report.is_flat() {
                    Ok(ReconcileOutcome::InSync)
                } else {
                    Err(self.unreconciled("flat", report))
                }
            }
            PositionState::PendingEntry(mut position) => {
                if report.is_flat() {
                    return Ok(self.clear_phantom(position, now));
                }
                if report.direction != position.direction {
                    let local = position.describe();
                    self.set_state(PositionState::PendingEntry(position));
                    return Err(self.unreconciled(&local, report));
                }
                let fill_price = report.avg_price.unwrap_or(position.entry_price);
                position.entry_price = fill_price;
                position.contracts = report.contracts;
                position.entry_confirmed = true;
                self.set_state(PositionState::Open(position));
                Ok(ReconcileOutcome::EntryConfirmed { fill_price })
            }
            PositionState::Open(mut position) => {
                if report.is_flat() {
                    if !position.entry_confirmed {
                        return Ok(self.clear_phantom(position, now));
                    }
                    let trade = self.finish(position, last_price, ExitReason::Reconcile, now);
                    return Ok(ReconcileOutcome::SyntheticClose { trade });
                }
                if report.direction != position.direction {
                    let local = position.describe();
                    self.set_state(PositionState::Open(position));
                    return Err(self.unreconciled(&local, report));
                }

                let mut outcome = ReconcileOutcome::InSync;
                if !position.entry_confirmed {
                    position.entry_confirmed = true;
                    if let Some(px) = report.avg_price {
                        position.entry_price = px;
                    }
                    outcome = ReconcileOutcome::EntryConfirmed {
                        fill_price: position.entry_price,
                    };
                }
                if report.contracts != position.contracts {
                    outcome = ReconcileOutcome::Corrected {
                        reason: format!(
                            "contracts {} -> {} per venue",
                            position.contracts, report.contracts
                        ),
                    };
                    position.contracts = report.contracts;
                }
                self.set_state(PositionState::Open(position));
                Ok(outcome)
            }
        }
    }

    fn clear_phantom(&self, position: Position, now: DateTime<Utc>) -> ReconcileOutcome {
        let cancel = position.orders.all();
        let entry = position.entry_price;
        // closing at the planned entry books exactly zero
        let trade = self.finish(position, entry, ExitReason::ReconcileNoFill, now);
        ReconcileOutcome::PhantomCleared { trade, cancel }
    }

    fn unreconciled(&self, local: &str, report: &VenuePosition) -> PositionError {
        error!(
            instrument = %self.instrument(),
            local,
            venue = %report.describe(),
            "Venue position cannot be reconciled"
        );
        PositionError::Unreconciled {
            instrument: self.instrument().to_string(),
            local: local.to_string(),
            venue: report.describe(),
        }
    }
}
