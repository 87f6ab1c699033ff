//! Signal generator driven by a fixed script of bar indices.
//!
//! Useful for replays whose signals were produced offline, and for tests
//! that need exact control over when entries and exit advice happen.

use std::collections::BTreeMap;

use pf_core::{Bar, ExitAction, MarketRegime, PositionView, SignalGenerator, TradeSetup};

#[derive(Debug, Clone, Default)]
pub struct ScriptedSignals {
    entries: BTreeMap<usize, TradeSetup>,
    exits: BTreeMap<usize, ExitAction>,
    name: String,
}

impl ScriptedSignals {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            ..Default::default()
        }
    }

    /// Propose `setup` when the latest visible bar has index `bar_index`.
    #[must_use]
    pub fn entry_at(mut self, bar_index: usize, setup: TradeSetup) -> Self {
        self.entries.insert(bar_index, setup);
        self
    }

    /// Advise `action` on the open position at `bar_index`.
    #[must_use]
    pub fn exit_at(mut self, bar_index: usize, action: ExitAction) -> Self {
        self.exits.insert(bar_index, action);
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl SignalGenerator for ScriptedSignals {
    fn check_entry(
        &self,
        bars: &[Bar],
        _regime: MarketRegime,
        min_confidence: f64,
    ) -> Option<TradeSetup> {
        let index = bars.len().checked_sub(1)?;
        self.entries
            .get(&index)
            .filter(|setup| setup.confidence >= min_confidence)
            .cloned()
    }

    fn manage_exit(&self, bars: &[Bar], _position: &PositionView) -> ExitAction {
        bars.len()
            .checked_sub(1)
            .and_then(|index| self.exits.get(&index).copied())
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pf_core::{Direction, Price};
    use rust_decimal_macros::dec;

    fn bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap();
        let p = Price::new(dec!(5000));
        (0..n)
            .map(|i| Bar::new(start + Duration::minutes(5 * i as i64), p, p, p, p, 100))
            .collect()
    }

    fn setup(confidence: f64) -> TradeSetup {
        TradeSetup::new(
            "MES",
            Direction::Long,
            Price::new(dec!(5000)),
            Price::new(dec!(4990)),
            Price::new(dec!(5020)),
        )
        .with_confidence(confidence)
    }

    #[test]
    fn test_entry_only_on_scripted_index() {
        let signals = ScriptedSignals::new().entry_at(2, setup(0.9));
        let bars = bars(5);
        assert!(signals.check_entry(&bars[..2], MarketRegime::Unknown, 0.5).is_none());
        assert!(signals.check_entry(&bars[..3], MarketRegime::Unknown, 0.5).is_some());
        assert!(signals.check_entry(&bars[..4], MarketRegime::Unknown, 0.5).is_none());
        assert!(signals.check_entry(&[], MarketRegime::Unknown, 0.5).is_none());
    }

    #[test]
    fn test_low_confidence_filtered() {
        let signals = ScriptedSignals::new().entry_at(0, setup(0.3));
        assert!(signals.check_entry(&bars(1), MarketRegime::Unknown, 0.5).is_none());
        assert!(signals.check_entry(&bars(1), MarketRegime::Unknown, 0.2).is_some());
    }
}
