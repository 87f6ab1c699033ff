//! Circuit breakers.
//!
//! Five independent gates, each answering `can_trade(now)` from its own
//! state only:
//! - DailyLoss: cumulative loss for the venue calendar day
//! - Consistency: single-day share of total profit (Challenge only)
//! - MarketHours: named blackout windows in venue time
//! - Inactivity: idle days since the last trade (warns, never blocks)
//! - StrategyCooldown: pause after consecutive losses
//!
//! `CircuitBreakers` composes them with logical AND and reports every
//! blocker, not only the first.

mod consistency;
mod cooldown;
mod daily_loss;
mod inactivity;
mod market_hours;

pub use consistency::{ConsistencyBreaker, ConsistencyConfig};
pub use cooldown::{CooldownConfig, StrategyCooldownBreaker};
pub use daily_loss::DailyLossBreaker;
pub use inactivity::{InactivityBreaker, InactivityConfig, InactivitySeverity};
pub use market_hours::{BlackoutWindow, MarketHoursBreaker, MarketHoursConfig};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RiskConfig;
use crate::error::RiskResult;

/// Point-in-time snapshot of one breaker. Observability only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub can_trade: bool,
    /// Why trading is blocked, when it is.
    pub reason: Option<String>,
    /// Non-blocking concern, e.g. inactivity limit approaching.
    pub warning: Option<String>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl CircuitBreakerStatus {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            can_trade: true,
            reason: None,
            warning: None,
            details: BTreeMap::new(),
        }
    }

    pub fn blocked(name: &str, reason: impl Into<String>) -> Self {
        Self {
            can_trade: false,
            reason: Some(reason.into()),
            ..Self::ok(name)
        }
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Aggregate snapshot across all breakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterCircuitBreakerStatus {
    pub can_trade: bool,
    pub blocked_by: Vec<String>,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub breakers: Vec<CircuitBreakerStatus>,
}

/// A gate that can veto trading on one condition.
pub trait CircuitBreaker {
    fn name(&self) -> &'static str;

    /// Pure predicate; never mutates.
    fn can_trade(&self, now: DateTime<Utc>) -> bool;

    fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus;
}

/// Master composition of the five breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakers {
    pub daily_loss: DailyLossBreaker,
    pub consistency: ConsistencyBreaker,
    pub market_hours: MarketHoursBreaker,
    pub inactivity: InactivityBreaker,
    pub cooldown: StrategyCooldownBreaker,
}

impl CircuitBreakers {
    /// Build all breakers from configuration. `started_at` anchors the
    /// inactivity clock until the first trade is recorded.
    pub fn from_config(config: &RiskConfig, started_at: DateTime<Utc>) -> RiskResult<Self> {
        let clock = config.venue_clock()?;
        Ok(Self {
            daily_loss: DailyLossBreaker::new(config.daily_loss_limit, clock),
            consistency: ConsistencyBreaker::new(config.consistency.clone(), config.mode, clock),
            market_hours: MarketHoursBreaker::new(config.market_hours.clone(), clock),
            inactivity: InactivityBreaker::new(config.max_idle_days(), clock, started_at),
            cooldown: StrategyCooldownBreaker::new(config.cooldown.clone()),
        })
    }

    fn all(&self) -> [&dyn CircuitBreaker; 5] {
        [
            &self.daily_loss,
            &self.consistency,
            &self.market_hours,
            &self.inactivity,
            &self.cooldown,
        ]
    }

    /// Logical AND of every breaker.
    pub fn can_trade(&self, now: DateTime<Utc>) -> bool {
        self.all().iter().all(|b| b.can_trade(now))
    }

    /// Evaluate every breaker and collect all blockers and warnings.
    pub fn check(&self, now: DateTime<Utc>) -> MasterCircuitBreakerStatus {
        let breakers: Vec<CircuitBreakerStatus> =
            self.all().iter().map(|b| b.status(now)).collect();

        let mut blocked_by = Vec::new();
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();
        for status in &breakers {
            if !status.can_trade {
                blocked_by.push(status.name.clone());
                if let Some(reason) = &status.reason {
                    reasons.push(reason.clone());
                }
            }
            if let Some(warning) = &status.warning {
                warnings.push(warning.clone());
            }
        }

        MasterCircuitBreakerStatus {
            can_trade: blocked_by.is_empty(),
            blocked_by,
            reasons,
            warnings,
            breakers,
        }
    }

    /// Fan a realised trade out to every stateful breaker.
    ///
    /// Call exactly once per closed trade; recording is not deduplicated.
    pub fn record_trade_result(&mut self, pnl: Decimal, at: DateTime<Utc>) {
        self.daily_loss.record_trade(pnl, at);
        self.consistency.record_trade(pnl, at);
        self.inactivity.record_trade(at);
        self.cooldown.record_trade(pnl, at);
        debug!(%pnl, %at, "Circuit breakers recorded trade result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn et(hour: u32, min: u32) -> DateTime<Utc> {
        // 2025-03-04 is a Tuesday; New York is UTC-5 in early March
        Utc.with_ymd_and_hms(2025, 3, 4, hour + 5, min, 0).unwrap()
    }

    fn breakers() -> CircuitBreakers {
        CircuitBreakers::from_config(&RiskConfig::default(), et(8, 0)).unwrap()
    }

    #[test]
    fn test_all_clear_midday() {
        let b = breakers();
        let status = b.check(et(11, 0));
        assert!(status.can_trade);
        assert!(b.can_trade(et(11, 0)));
        assert!(status.blocked_by.is_empty());
        assert_eq!(status.breakers.len(), 5);
    }

    #[test]
    fn test_collects_every_blocker() {
        let mut b = breakers();
        // Two losses trip the cooldown and, at 625 each, the daily limit.
        b.record_trade_result(dec!(-625), et(15, 46));
        b.record_trade_result(dec!(-625), et(15, 47));

        // 15:50 is inside the close blackout as well
        let status = b.check(et(15, 50));
        assert!(!status.can_trade);
        assert_eq!(
            status.blocked_by,
            vec!["daily_loss", "market_hours", "strategy_cooldown"]
        );
        assert_eq!(status.reasons.len(), 3);
    }

    #[test]
    fn test_inactivity_warns_without_blocking() {
        let b = breakers();
        let later = et(11, 0) + chrono::Duration::days(6);
        let status = b.check(later);
        assert!(status.can_trade);
        assert_eq!(status.warnings.len(), 1);
    }
}
