use chrono::{DateTime, NaiveTime, Utc};
use pf_core::VenueClock;
use serde::{Deserialize, Serialize};

use super::{CircuitBreaker, CircuitBreakerStatus};
use crate::error::{RiskError, RiskResult};

/// Named time-of-day window in venue local time.
///
/// Half-open `[start, end)`. A window whose end is earlier than its start
/// wraps midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub name: String,
    /// Start time, `HH:MM`.
    pub start: String,
    /// End time, `HH:MM` (exclusive).
    pub end: String,
}

impl BlackoutWindow {
    pub fn new(name: &str, start: &str, end: &str) -> Self {
        Self {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.start, "%H:%M").ok()
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.end, "%H:%M").ok()
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (self.start_time(), self.end_time()) else {
            return false;
        };

        if start <= end {
            time >= start && time < end
        } else {
            time >= start || time < end
        }
    }
}

/// Blackout table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    #[serde(default = "default_windows")]
    pub windows: Vec<BlackoutWindow>,
    /// Also block the daily settlement break (17:00-18:00 venue time).
    #[serde(default)]
    pub include_settlement_break: bool,
}

fn default_windows() -> Vec<BlackoutWindow> {
    vec![
        BlackoutWindow::new("market_open", "09:30", "09:45"),
        BlackoutWindow::new("market_close", "15:45", "16:00"),
    ]
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            include_settlement_break: false,
        }
    }
}

impl MarketHoursConfig {
    /// Reject windows whose times do not parse.
    pub fn validate(&self) -> RiskResult<()> {
        for w in &self.windows {
            if w.start_time().is_none() || w.end_time().is_none() {
                return Err(RiskError::ConfigError(format!(
                    "blackout window {} has invalid times {}-{}",
                    w.name, w.start, w.end
                )));
            }
        }
        Ok(())
    }

    fn effective_windows(&self) -> Vec<BlackoutWindow> {
        let mut windows = self.windows.clone();
        if self.include_settlement_break {
            windows.push(BlackoutWindow::new("settlement_break", "17:00", "18:00"));
        }
        windows
    }
}

/// Blocks entries inside named volatility windows.
#[derive(Debug, Clone)]
pub struct MarketHoursBreaker {
    windows: Vec<BlackoutWindow>,
    clock: VenueClock,
}

impl MarketHoursBreaker {
    pub fn new(config: MarketHoursConfig, clock: VenueClock) -> Self {
        Self {
            windows: config.effective_windows(),
            clock,
        }
    }

    pub fn windows(&self) -> &[BlackoutWindow] {
        &self.windows
    }

    /// First window containing `now`, if any.
    pub fn active_window(&self, now: DateTime<Utc>) -> Option<&BlackoutWindow> {
        let time = self.clock.venue_time(now);
        self.windows.iter().find(|w| w.contains(time))
    }
}

impl CircuitBreaker for MarketHoursBreaker {
    fn name(&self) -> &'static str {
        "market_hours"
    }

    fn can_trade(&self, now: DateTime<Utc>) -> bool {
        self.active_window(now).is_none()
    }

    fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        let venue_time = self.clock.venue_time(now).format("%H:%M:%S");
        let status = match self.active_window(now) {
            Some(w) => CircuitBreakerStatus::blocked(
                self.name(),
                format!(
                    "inside {} blackout ({}-{} {})",
                    w.name,
                    w.start,
                    w.end,
                    self.clock.tz()
                ),
            ),
            None => CircuitBreakerStatus::ok(self.name()),
        };
        status.with_detail("venue_time", venue_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn et(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, hour + 5, min, 0).unwrap()
    }

    #[test]
    fn test_window_half_open() {
        let w = BlackoutWindow::new("market_open", "09:30", "09:45");
        assert!(w.contains(t(9, 30)));
        assert!(w.contains(t(9, 44)));
        assert!(!w.contains(t(9, 45)));
        assert!(!w.contains(t(9, 29)));
    }

    #[test]
    fn test_window_midnight_wrap() {
        let w = BlackoutWindow::new("overnight", "23:00", "01:00");
        assert!(w.contains(t(23, 30)));
        assert!(w.contains(t(0, 30)));
        assert!(!w.contains(t(1, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn test_invalid_window_never_matches() {
        let w = BlackoutWindow::new("bad", "9h30", "09:45");
        assert!(!w.contains(t(9, 35)));
        let config = MarketHoursConfig {
            windows: vec![w],
            include_settlement_break: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breaker_uses_venue_time() {
        let b = MarketHoursBreaker::new(MarketHoursConfig::default(), VenueClock::default());
        assert!(!b.can_trade(et(9, 30)));
        assert!(b.can_trade(et(9, 45)));
        assert!(!b.can_trade(et(15, 59)));
        assert!(b.can_trade(et(16, 0)));
        assert_eq!(b.active_window(et(15, 50)).unwrap().name, "market_close");
        let status = b.status(et(9, 31));
        assert!(status.reason.unwrap().contains("market_open"));
    }

    #[test]
    fn test_settlement_break_optional() {
        let config = MarketHoursConfig {
            include_settlement_break: true,
            ..MarketHoursConfig::default()
        };
        let b = MarketHoursBreaker::new(config, VenueClock::default());
        assert_eq!(b.windows().len(), 3);
        assert!(!b.can_trade(et(17, 30)));
        assert!(b.can_trade(et(18, 0)));
    }
}
