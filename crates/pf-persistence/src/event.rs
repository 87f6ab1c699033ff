//! Event log records.

use chrono::{DateTime, Utc};
use pf_core::{ClientOrderId, Direction, ExitProfile, OrderRole, Price, TradeSetup};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    #[serde(flatten)]
    pub event: TradeEvent,
}

impl EventRecord {
    pub fn new(timestamp: DateTime<Utc>, instrument: &str, event: TradeEvent) -> Self {
        Self {
            timestamp,
            instrument: instrument.to_string(),
            event,
        }
    }
}

/// Lifecycle events, in the order a trade produces them:
/// signal, order, fill, stop update, exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    /// A setup was evaluated by the risk gate.
    Signal {
        setup: TradeSetup,
        approved: bool,
        contracts: u32,
        reasons: Vec<String>,
    },
    OrderSubmitted {
        order_id: ClientOrderId,
        role: OrderRole,
        direction: Direction,
        contracts: u32,
        price: Option<Price>,
    },
    Fill {
        order_id: ClientOrderId,
        role: OrderRole,
        price: Price,
        contracts: u32,
    },
    StopUpdate {
        old_stop: Price,
        new_stop: Price,
        reason: String,
    },
    Exit {
        direction: Direction,
        entry_price: Price,
        exit_price: Price,
        contracts: u32,
        pnl: Decimal,
        reason: String,
        entry_time: DateTime<Utc>,
        setup_type: String,
        #[serde(default)]
        exit_profile: ExitProfile,
    },
    Status {
        message: String,
    },
    Error {
        message: String,
    },
}

impl TradeEvent {
    /// Short kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signal { .. } => "signal",
            Self::OrderSubmitted { .. } => "order_submitted",
            Self::Fill { .. } => "fill",
            Self::StopUpdate { .. } => "stop_update",
            Self::Exit { .. } => "exit",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_is_flat_json() {
        let record = EventRecord::new(
            DateTime::parse_from_rfc3339("2025-03-04T15:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            "MES",
            TradeEvent::StopUpdate {
                old_stop: Price::new(dec!(4990)),
                new_stop: Price::new(dec!(5000)),
                reason: "breakeven".to_string(),
            },
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""event":"stop_update""#));
        assert!(json.contains(r#""instrument":"MES""#));
        assert!(json.contains(r#""new_stop":"5000""#));

        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.event.kind(), "stop_update");
    }
}
