//! Execution venue interface.
//!
//! The broker client lives outside this workspace. The control plane talks
//! to it through `ExecutionVenue` and receives asynchronous callbacks as
//! `VenueEvent`s, which the live worker serializes into its own queue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pf_core::{Bar, BracketOrder, ClientOrderId, Direction, OrderRequest, Price};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Venue request failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    #[error("Venue disconnected: {0}")]
    Disconnected(String),

    #[error("Venue request timed out: {0}")]
    Timeout(String),

    /// Historical data pacing violation.
    #[error("Venue pacing violation: {0}")]
    Pacing(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Venue error: {0}")]
    Other(String),
}

impl VenueError {
    /// Retry later with back-off rather than giving up.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::Timeout(_) | Self::Pacing(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disconnected(_) => "disconnected",
            Self::Timeout(_) => "timeout",
            Self::Pacing(_) => "pacing",
            Self::Rejected(_) => "rejected",
            Self::Other(_) => "other",
        }
    }
}

pub type VenueResult<T> = Result<T, VenueError>;

/// The venue's view of one instrument's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub instrument: String,
    pub direction: Direction,
    pub contracts: u32,
    pub avg_price: Option<Price>,
}

impl VenuePosition {
    pub fn flat(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            direction: Direction::None,
            contracts: 0,
            avg_price: None,
        }
    }

    pub fn new(instrument: &str, direction: Direction, contracts: u32, avg_price: Price) -> Self {
        Self {
            instrument: instrument.to_string(),
            direction,
            contracts,
            avg_price: Some(avg_price),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.contracts == 0 || self.direction == Direction::None
    }

    pub fn describe(&self) -> String {
        if self.is_flat() {
            "flat".to_string()
        } else {
            match self.avg_price {
                Some(px) => format!("{} {} @ {}", self.direction, self.contracts, px),
                None => format!("{} {}", self.direction, self.contracts),
            }
        }
    }
}

/// Order status reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum OrderStatus {
    Working,
    Filled,
    Cancelled,
    Rejected(String),
}

/// Asynchronous venue callback.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEvent {
    OrderStatus {
        order_id: ClientOrderId,
        status: OrderStatus,
    },
    Fill {
        order_id: ClientOrderId,
        price: Price,
        contracts: u32,
        at: DateTime<Utc>,
    },
    Position(VenuePosition),
    Disconnected,
    Reconnected,
}

/// Broker connection used by the live runtime.
///
/// Implementations apply their own request timeouts and map failures to
/// `VenueError`; none of these calls may block indefinitely.
pub trait ExecutionVenue: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, VenueResult<()>>;

    fn disconnect(&self) -> BoxFuture<'_, VenueResult<()>>;

    fn submit_order(&self, order: OrderRequest) -> BoxFuture<'_, VenueResult<()>>;

    /// Entry with linked stop and target (OCO children).
    fn submit_bracket(&self, bracket: BracketOrder) -> BoxFuture<'_, VenueResult<()>>;

    fn modify_stop(&self, order_id: ClientOrderId, new_stop: Price) -> BoxFuture<'_, VenueResult<()>>;

    fn cancel_order(&self, order_id: ClientOrderId) -> BoxFuture<'_, VenueResult<()>>;

    /// Completed bars, oldest first. `since` limits the history requested.
    fn fetch_bars(
        &self,
        instrument: &str,
        since: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, VenueResult<Vec<Bar>>>;

    fn position(&self, instrument: &str) -> BoxFuture<'_, VenueResult<VenuePosition>>;

    /// Register for order, fill and position callbacks for an instrument.
    fn subscribe(
        &self,
        instrument: &str,
        events: mpsc::UnboundedSender<VenueEvent>,
    ) -> BoxFuture<'_, VenueResult<()>>;
}

/// Arc wrapper for venue trait objects.
pub type DynVenue = Arc<dyn ExecutionVenue>;

/// In-memory venue for tests.
///
/// Records every request. With `auto_fill` on, entries and market orders
/// fill immediately at their price (market orders at the last bar close),
/// the position book is updated and a `Fill` callback is sent.
#[derive(Debug, Default)]
pub struct MockVenue {
    orders: parking_lot::Mutex<Vec<OrderRequest>>,
    brackets: parking_lot::Mutex<Vec<BracketOrder>>,
    cancels: parking_lot::Mutex<Vec<ClientOrderId>>,
    stop_moves: parking_lot::Mutex<Vec<(ClientOrderId, Price)>>,
    positions: parking_lot::Mutex<HashMap<String, VenuePosition>>,
    bars: parking_lot::Mutex<HashMap<String, Vec<Bar>>>,
    subscribers: parking_lot::Mutex<HashMap<String, mpsc::UnboundedSender<VenueEvent>>>,
    /// Returned once by the next request, then cleared.
    next_error: parking_lot::Mutex<Option<VenueError>>,
    /// Returned by every `fetch_bars` while set.
    bars_error: parking_lot::Mutex<Option<VenueError>>,
    auto_fill: AtomicBool,
    connected: AtomicBool,
}

impl MockVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_fill(self) -> Self {
        self.auto_fill.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_bars(&self, instrument: &str, bars: Vec<Bar>) {
        self.bars.lock().insert(instrument.to_string(), bars);
    }

    pub fn set_position(&self, report: VenuePosition) {
        self.positions.lock().insert(report.instrument.clone(), report);
    }

    pub fn set_next_error(&self, error: VenueError) {
        *self.next_error.lock() = Some(error);
    }

    pub fn set_bars_error(&self, error: Option<VenueError>) {
        *self.bars_error.lock() = error;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn brackets(&self) -> Vec<BracketOrder> {
        self.brackets.lock().clone()
    }

    pub fn cancels(&self) -> Vec<ClientOrderId> {
        self.cancels.lock().clone()
    }

    pub fn stop_moves(&self) -> Vec<(ClientOrderId, Price)> {
        self.stop_moves.lock().clone()
    }

    /// Push a callback to the instrument's subscriber.
    pub fn emit(&self, instrument: &str, event: VenueEvent) -> bool {
        self.subscribers
            .lock()
            .get(instrument)
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    fn take_error(&self) -> VenueResult<()> {
        match self.next_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn last_close(&self, instrument: &str) -> Option<Price> {
        self.bars
            .lock()
            .get(instrument)
            .and_then(|bars| bars.last())
            .map(|b| b.close)
    }

    /// Apply a fill to the position book and notify the subscriber.
    fn fill(&self, order: &OrderRequest, price: Price) {
        {
            let mut positions = self.positions.lock();
            let entry = positions
                .entry(order.instrument.clone())
                .or_insert_with(|| VenuePosition::flat(&order.instrument));
            if entry.is_flat() {
                *entry = VenuePosition::new(&order.instrument, order.direction, order.contracts, price);
            } else if entry.direction == order.direction {
                entry.contracts += order.contracts;
            } else if order.contracts >= entry.contracts {
                let rest = order.contracts - entry.contracts;
                *entry = if rest == 0 {
                    VenuePosition::flat(&order.instrument)
                } else {
                    VenuePosition::new(&order.instrument, order.direction, rest, price)
                };
            } else {
                entry.contracts -= order.contracts;
            }
        }
        self.emit(
            &order.instrument,
            VenueEvent::Fill {
                order_id: order.client_id.clone(),
                price,
                contracts: order.contracts,
                at: Utc::now(),
            },
        );
    }
}

impl ExecutionVenue for MockVenue {
    fn connect(&self) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            self.take_error()?;
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn submit_order(&self, order: OrderRequest) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            self.take_error()?;
            self.orders.lock().push(order.clone());
            if self.auto_fill.load(Ordering::SeqCst) {
                if let Some(price) = order.price.or_else(|| self.last_close(&order.instrument)) {
                    self.fill(&order, price);
                }
            }
            Ok(())
        })
    }

    fn submit_bracket(&self, bracket: BracketOrder) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            self.take_error()?;
            self.brackets.lock().push(bracket.clone());
            if self.auto_fill.load(Ordering::SeqCst) {
                if let Some(price) = bracket.entry.price {
                    self.fill(&bracket.entry, price);
                }
            }
            Ok(())
        })
    }

    fn modify_stop(&self, order_id: ClientOrderId, new_stop: Price) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            self.take_error()?;
            self.stop_moves.lock().push((order_id, new_stop));
            Ok(())
        })
    }

    fn cancel_order(&self, order_id: ClientOrderId) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            self.take_error()?;
            self.cancels.lock().push(order_id);
            Ok(())
        })
    }

    fn fetch_bars(
        &self,
        instrument: &str,
        since: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, VenueResult<Vec<Bar>>> {
        let instrument = instrument.to_string();
        Box::pin(async move {
            if let Some(e) = self.bars_error.lock().clone() {
                return Err(e);
            }
            self.take_error()?;
            let bars = self.bars.lock().get(&instrument).cloned().unwrap_or_default();
            Ok(match since {
                Some(since) => bars.into_iter().filter(|b| b.timestamp > since).collect(),
                None => bars,
            })
        })
    }

    fn position(&self, instrument: &str) -> BoxFuture<'_, VenueResult<VenuePosition>> {
        let instrument = instrument.to_string();
        Box::pin(async move {
            self.take_error()?;
            Ok(self
                .positions
                .lock()
                .get(&instrument)
                .cloned()
                .unwrap_or_else(|| VenuePosition::flat(&instrument)))
        })
    }

    fn subscribe(
        &self,
        instrument: &str,
        events: mpsc::UnboundedSender<VenueEvent>,
    ) -> BoxFuture<'_, VenueResult<()>> {
        let instrument = instrument.to_string();
        Box::pin(async move {
            self.subscribers.lock().insert(instrument, events);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::OrderRole;
    use rust_decimal_macros::dec;

    #[test]
    fn test_retryable_errors() {
        assert!(VenueError::Disconnected("eof".into()).is_retryable());
        assert!(VenueError::Timeout("hmds".into()).is_retryable());
        assert!(VenueError::Pacing("60 requests".into()).is_retryable());
        assert!(!VenueError::Rejected("margin".into()).is_retryable());
        assert!(!VenueError::Other("?".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_mock_records_and_errors_once() {
        let venue = MockVenue::new();
        venue.set_next_error(VenueError::Timeout("position".into()));
        assert!(venue.position("MES").await.is_err());
        assert!(venue.position("MES").await.unwrap().is_flat());

        let order = OrderRequest::market("MES", Direction::Short, 1, OrderRole::Flatten);
        venue.submit_order(order).await.unwrap();
        assert_eq!(venue.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_auto_fill_updates_book() {
        let venue = MockVenue::new().with_auto_fill();
        let (tx, mut rx) = mpsc::unbounded_channel();
        venue.subscribe("MES", tx).await.unwrap();

        let bracket = BracketOrder::new(
            "MES",
            Direction::Long,
            2,
            Price::new(dec!(5000)),
            Price::new(dec!(4990)),
            Price::new(dec!(5020)),
        );
        let entry_id = bracket.entry.client_id.clone();
        venue.submit_bracket(bracket).await.unwrap();

        let report = venue.position("MES").await.unwrap();
        assert_eq!(report.direction, Direction::Long);
        assert_eq!(report.contracts, 2);
        match rx.recv().await.unwrap() {
            VenueEvent::Fill { order_id, .. } => assert_eq!(order_id, entry_id),
            other => panic!("unexpected event {other:?}"),
        }

        let flatten = OrderRequest::limit("MES", Direction::Short, 2, Price::new(dec!(5004)), OrderRole::Flatten);
        venue.submit_order(flatten).await.unwrap();
        assert!(venue.position("MES").await.unwrap().is_flat());
    }
}
