use chrono::{DateTime, Utc};
use pf_core::VenueClock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CircuitBreaker, CircuitBreakerStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InactivityConfig {
    /// Override the per-mode idle-day limit.
    #[serde(default)]
    pub max_idle_days: Option<i64>,
}

/// Severity ladder derived from days remaining before the idle limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InactivitySeverity {
    Ok,
    Warning,
    Critical,
    Breach,
}

impl InactivitySeverity {
    fn from_days_remaining(days_remaining: i64) -> Self {
        match days_remaining {
            d if d <= 0 => Self::Breach,
            1 => Self::Critical,
            2..=3 => Self::Warning,
            _ => Self::Ok,
        }
    }
}

impl std::fmt::Display for InactivitySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
            Self::Breach => write!(f, "BREACH"),
        }
    }
}

/// Tracks venue-calendar days since the last trade.
///
/// Never blocks: the only cure for inactivity is to trade. Surfaces a
/// warning once the limit is close.
#[derive(Debug, Clone)]
pub struct InactivityBreaker {
    max_idle_days: i64,
    clock: VenueClock,
    last_activity: DateTime<Utc>,
}

impl InactivityBreaker {
    pub fn new(max_idle_days: i64, clock: VenueClock, started_at: DateTime<Utc>) -> Self {
        Self {
            max_idle_days,
            clock,
            last_activity: started_at,
        }
    }

    pub fn record_trade(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity {
            self.last_activity = at;
        }
    }

    /// Move the idle clock's anchor back to `at`, e.g. the first event of a
    /// recovered log. Never moves it forward.
    pub fn backdate(&mut self, at: DateTime<Utc>) {
        if at < self.last_activity {
            self.last_activity = at;
        }
    }

    #[inline]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[inline]
    pub fn max_idle_days(&self) -> i64 {
        self.max_idle_days
    }

    pub fn idle_days(&self, now: DateTime<Utc>) -> i64 {
        self.clock.days_between(self.last_activity, now).max(0)
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.max_idle_days - self.idle_days(now)
    }

    /// True from one day before the hard limit.
    pub fn is_in_danger(&self, now: DateTime<Utc>) -> bool {
        self.days_remaining(now) <= 1
    }

    pub fn severity(&self, now: DateTime<Utc>) -> InactivitySeverity {
        InactivitySeverity::from_days_remaining(self.days_remaining(now))
    }
}

impl CircuitBreaker for InactivityBreaker {
    fn name(&self) -> &'static str {
        "inactivity"
    }

    fn can_trade(&self, _now: DateTime<Utc>) -> bool {
        true
    }

    fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        let idle = self.idle_days(now);
        let remaining = self.days_remaining(now);
        let severity = self.severity(now);

        let mut status = CircuitBreakerStatus::ok(self.name())
            .with_detail("idle_days", idle)
            .with_detail("days_remaining", remaining)
            .with_detail("severity", severity);

        if severity != InactivitySeverity::Ok {
            if severity >= InactivitySeverity::Critical {
                warn!(idle, remaining, %severity, "Inactivity limit approaching");
            }
            status = status.with_warning(format!(
                "inactivity {severity}: {idle} idle days, {remaining} remaining of {}",
                self.max_idle_days
            ));
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn et(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour + 5, 0, 0).unwrap()
    }

    #[test]
    fn test_severity_ladder() {
        let b = InactivityBreaker::new(7, VenueClock::default(), et(3, 10));
        assert_eq!(b.severity(et(5, 10)), InactivitySeverity::Ok);
        assert_eq!(b.severity(et(7, 10)), InactivitySeverity::Warning);
        assert_eq!(b.severity(et(9, 10)), InactivitySeverity::Critical);
        assert!(b.is_in_danger(et(9, 10)));
        assert!(!b.is_in_danger(et(8, 10)));
        assert_eq!(b.severity(et(10, 10)), InactivitySeverity::Breach);
    }

    #[test]
    fn test_never_blocks() {
        let b = InactivityBreaker::new(7, VenueClock::default(), et(3, 10));
        let much_later = et(3, 10) + Duration::days(40);
        assert!(b.can_trade(much_later));
        let status = b.status(much_later);
        assert!(status.can_trade);
        assert!(status.warning.unwrap().contains("BREACH"));
    }

    #[test]
    fn test_trade_resets_idle_clock() {
        let mut b = InactivityBreaker::new(7, VenueClock::default(), et(3, 10));
        b.record_trade(et(8, 10));
        assert_eq!(b.idle_days(et(9, 10)), 1);
        // out-of-order record does not move the clock back
        b.record_trade(et(4, 10));
        assert_eq!(b.last_activity(), et(8, 10));
    }

    #[test]
    fn test_backdate_only_moves_anchor_earlier() {
        let mut b = InactivityBreaker::new(7, VenueClock::default(), et(10, 10));
        b.backdate(et(3, 10));
        assert_eq!(b.last_activity(), et(3, 10));
        assert_eq!(b.severity(et(10, 10)), InactivitySeverity::Breach);
        b.backdate(et(5, 10));
        assert_eq!(b.last_activity(), et(3, 10));
    }

    #[test]
    fn test_idle_days_count_venue_dates() {
        let b = InactivityBreaker::new(30, VenueClock::default(), et(3, 18));
        // next morning is one venue day later even though < 24h elapsed
        assert_eq!(b.idle_days(et(4, 9)), 1);
    }
}
