//! Candidate trade setups.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
use crate::error::{CoreError, Result};
use crate::types::Direction;

/// How the position is managed once open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitProfile {
    /// Fixed stop and target, breakeven after one ATR.
    #[default]
    Fixed,
    /// Trend ride: trail the stop `trail_distance` points behind the best
    /// price since entry. The target stays as a far backstop.
    TrendRide { trail_distance: Decimal },
}

/// A candidate trade produced by a signal generator.
///
/// Immutable once built; the risk gate and position manager only read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub instrument: String,
    pub direction: Direction,
    pub entry: Price,
    pub stop: Price,
    pub target: Price,
    /// Signal confidence in [0, 1].
    pub confidence: f64,
    pub setup_type: String,
    #[serde(default)]
    pub exit_profile: ExitProfile,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TradeSetup {
    pub fn new(
        instrument: impl Into<String>,
        direction: Direction,
        entry: Price,
        stop: Price,
        target: Price,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            direction,
            entry,
            stop,
            target,
            confidence: 1.0,
            setup_type: "unspecified".to_string(),
            exit_profile: ExitProfile::Fixed,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_setup_type(mut self, setup_type: impl Into<String>) -> Self {
        self.setup_type = setup_type.into();
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_exit_profile(mut self, profile: ExitProfile) -> Self {
        self.exit_profile = profile;
        self
    }

    /// Stop distance in points: `|entry - stop|`.
    #[inline]
    pub fn risk_per_unit(&self) -> Decimal {
        self.entry.distance(self.stop)
    }

    /// Target distance in points: `|target - entry|`.
    #[inline]
    pub fn reward_per_unit(&self) -> Decimal {
        self.target.distance(self.entry)
    }

    /// Reward-to-risk ratio, zero when risk is zero.
    pub fn reward_risk_ratio(&self) -> Decimal {
        let risk = self.risk_per_unit();
        if risk.is_zero() {
            return Decimal::ZERO;
        }
        self.reward_per_unit() / risk
    }

    /// Check internal consistency of the price ladder.
    ///
    /// Long: stop < entry < target. Short: target < entry < stop.
    pub fn validate(&self) -> Result<()> {
        let (stop_ok, target_ok) = match self.direction {
            Direction::Long => (self.stop < self.entry, self.target > self.entry),
            Direction::Short => (self.stop > self.entry, self.target < self.entry),
            Direction::None => {
                return Err(CoreError::InvalidSetup(
                    "direction is none".to_string(),
                ))
            }
        };

        if !stop_ok {
            return Err(CoreError::InvalidSetup(format!(
                "stop {} is not on the loss side of entry {} for {}",
                self.stop, self.entry, self.direction
            )));
        }
        if !target_ok {
            return Err(CoreError::InvalidSetup(format!(
                "target {} is not on the profit side of entry {} for {}",
                self.target, self.entry, self.direction
            )));
        }
        if self.risk_per_unit() <= Decimal::ZERO {
            return Err(CoreError::InvalidSetup(
                "risk per unit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_setup() -> TradeSetup {
        TradeSetup::new(
            "MES",
            Direction::Long,
            Price::new(dec!(5000)),
            Price::new(dec!(4990)),
            Price::new(dec!(5020)),
        )
    }

    #[test]
    fn test_long_setup_valid() {
        let s = long_setup();
        assert!(s.is_valid());
        assert_eq!(s.risk_per_unit(), dec!(10));
        assert_eq!(s.reward_per_unit(), dec!(20));
        assert_eq!(s.reward_risk_ratio(), dec!(2));
    }

    #[test]
    fn test_short_setup_valid() {
        let s = TradeSetup::new(
            "MNQ",
            Direction::Short,
            Price::new(dec!(18000)),
            Price::new(dec!(18040)),
            Price::new(dec!(17950)),
        );
        assert!(s.is_valid());
    }

    #[test]
    fn test_stop_on_wrong_side_rejected() {
        let mut s = long_setup();
        s.stop = Price::new(dec!(5005));
        assert!(matches!(s.validate(), Err(CoreError::InvalidSetup(_))));
    }

    #[test]
    fn test_target_on_wrong_side_rejected() {
        let mut s = long_setup();
        s.target = Price::new(dec!(4995));
        assert!(!s.is_valid());
    }

    #[test]
    fn test_none_direction_rejected() {
        let mut s = long_setup();
        s.direction = Direction::None;
        assert!(!s.is_valid());
    }

    #[test]
    fn test_zero_risk_rejected() {
        let mut s = long_setup();
        s.stop = s.entry;
        assert!(!s.is_valid());
        assert_eq!(s.reward_risk_ratio(), Decimal::ZERO);
    }
}
