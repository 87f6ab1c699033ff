//! Signal generator capability interface.
//!
//! Strategies live outside this workspace. The control plane only needs two
//! calls: "is there an entry here?" and "what should the open trade do?".
//! A concrete generator is selected per instrument at construction time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
use crate::setup::{ExitProfile, TradeSetup};
use crate::types::{Bar, Direction, MarketRegime};

/// Exit advice returned by a signal generator for an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "action", content = "price", rename_all = "snake_case")]
pub enum ExitAction {
    /// Keep the position as is.
    #[default]
    Hold,
    /// Close now at the given price (or the bar close).
    Stop(Option<Price>),
    /// Take profit now at the given price (or the bar close).
    Target(Option<Price>),
    /// Move the stop to the entry price.
    Breakeven,
    /// Move the stop to the given price, if it improves the stop.
    Trail(Price),
    /// Close at the given price (or the bar close) for time reasons.
    TimeExit(Option<Price>),
}

/// Read-only view of an open position handed to `manage_exit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Price,
    pub stop: Price,
    pub target: Price,
    pub contracts: u32,
    pub entry_time: DateTime<Utc>,
    pub bars_held: usize,
    pub setup_type: String,
    pub exit_profile: ExitProfile,
    pub trailing_extreme: Option<Price>,
}

/// Capability interface implemented by entry/exit strategies.
pub trait SignalGenerator: Send + Sync {
    /// Inspect bars up to and including the latest one and propose a setup.
    ///
    /// Returns `None` when there is no trade, when history is shorter than
    /// the strategy's warm-up, or when the best candidate's confidence is
    /// below `min_confidence`.
    fn check_entry(
        &self,
        bars: &[Bar],
        regime: MarketRegime,
        min_confidence: f64,
    ) -> Option<TradeSetup>;

    /// Advise on an open position. Default holds and lets the position
    /// manager's stop/target/breakeven/trail rules do the work.
    fn manage_exit(&self, _bars: &[Bar], _position: &PositionView) -> ExitAction {
        ExitAction::Hold
    }

    /// Strategy name for logs.
    fn name(&self) -> &str {
        "signal_generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct Never;

    impl SignalGenerator for Never {
        fn check_entry(&self, _: &[Bar], _: MarketRegime, _: f64) -> Option<TradeSetup> {
            None
        }
    }

    #[test]
    fn test_default_exit_advice_is_hold() {
        let view = PositionView {
            instrument: "MES".to_string(),
            direction: Direction::Long,
            entry_price: Price::new(dec!(5000)),
            stop: Price::new(dec!(4990)),
            target: Price::new(dec!(5020)),
            contracts: 1,
            entry_time: Utc::now(),
            bars_held: 3,
            setup_type: "test".to_string(),
            exit_profile: ExitProfile::Fixed,
            trailing_extreme: None,
        };
        assert_eq!(Never.manage_exit(&[], &view), ExitAction::Hold);
        assert_eq!(Never.name(), "signal_generator");
    }

    #[test]
    fn test_exit_action_serde() {
        let json = serde_json::to_string(&ExitAction::Trail(Price::new(dec!(5001.5)))).unwrap();
        assert_eq!(json, r#"{"action":"trail","price":"5001.5"}"#);
        let back: ExitAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExitAction::Trail(Price::new(dec!(5001.5))));
    }
}
