use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use pf_core::{AccountMode, VenueClock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CircuitBreaker, CircuitBreakerStatus};

/// Configuration for the profit-concentration rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// A single day's share of total profit that trips the rule.
    #[serde(default = "default_threshold")]
    pub threshold: Decimal,
    /// The rule stays silent until booked total profit reaches this.
    #[serde(default = "default_min_total_profit")]
    pub min_total_profit: Decimal,
}

fn default_threshold() -> Decimal {
    Decimal::new(40, 2)
}

fn default_min_total_profit() -> Decimal {
    Decimal::from(500)
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_total_profit: default_min_total_profit(),
        }
    }
}

/// Limits how much of total profit one venue day may contribute.
///
/// Active in Challenge mode only; permissive otherwise. Both checks use the
/// same threshold but different denominators:
/// - `can_take_more_profit`: today / total, as booked
/// - `would_violate_consistency`: (today + extra) / (total + extra)
///
/// The minimum-profit floor is evaluated on profit already booked.
#[derive(Debug, Clone)]
pub struct ConsistencyBreaker {
    config: ConsistencyConfig,
    enabled: bool,
    clock: VenueClock,
    total_profit: Decimal,
    daily_profit: BTreeMap<NaiveDate, Decimal>,
}

impl ConsistencyBreaker {
    pub fn new(config: ConsistencyConfig, mode: AccountMode, clock: VenueClock) -> Self {
        Self {
            config,
            enabled: mode == AccountMode::Challenge,
            clock,
            total_profit: Decimal::ZERO,
            daily_profit: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_trade(&mut self, pnl: Decimal, at: DateTime<Utc>) {
        let date = self.clock.venue_date(at);
        *self.daily_profit.entry(date).or_insert(Decimal::ZERO) += pnl;
        self.total_profit += pnl;
    }

    /// Net profit booked to date.
    #[inline]
    pub fn total_profit(&self) -> Decimal {
        self.total_profit
    }

    /// Net profit booked on the venue day containing `now`.
    pub fn today_profit(&self, now: DateTime<Utc>) -> Decimal {
        self.daily_profit
            .get(&self.clock.venue_date(now))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Best single day so far, if any day was profitable.
    pub fn best_day(&self) -> Option<(NaiveDate, Decimal)> {
        self.daily_profit
            .iter()
            .filter(|(_, p)| **p > Decimal::ZERO)
            .max_by(|a, b| a.1.cmp(b.1))
            .map(|(d, p)| (*d, *p))
    }

    fn floor_met(&self) -> bool {
        self.total_profit >= self.config.min_total_profit
    }

    /// Today's share of total profit, when meaningful.
    pub fn today_share(&self, now: DateTime<Utc>) -> Option<Decimal> {
        if self.total_profit <= Decimal::ZERO {
            return None;
        }
        Some(self.today_profit(now) / self.total_profit)
    }

    /// Backward-looking: is today's booked share still under the threshold?
    pub fn can_take_more_profit(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || !self.floor_met() {
            return true;
        }
        let today = self.today_profit(now);
        if today <= Decimal::ZERO {
            return true;
        }
        today / self.total_profit < self.config.threshold
    }

    /// Forward-looking: would booking `extra_profit` today trip the rule?
    pub fn would_violate_consistency(&self, extra_profit: Decimal, now: DateTime<Utc>) -> bool {
        if !self.enabled || !self.floor_met() {
            return false;
        }
        let today = self.today_profit(now) + extra_profit;
        let total = self.total_profit + extra_profit;
        if total <= Decimal::ZERO || today <= Decimal::ZERO {
            return false;
        }
        let share = today / total;
        let violates = share >= self.config.threshold;
        if violates {
            debug!(
                %today,
                %total,
                share = %share.round_dp(4),
                threshold = %self.config.threshold,
                "Consistency forward check would violate"
            );
        }
        violates
    }
}

impl CircuitBreaker for ConsistencyBreaker {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn can_trade(&self, now: DateTime<Utc>) -> bool {
        self.can_take_more_profit(now)
    }

    fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        let today = self.today_profit(now);
        let status = if self.can_trade(now) {
            CircuitBreakerStatus::ok(self.name())
        } else {
            let share = self.today_share(now).unwrap_or(Decimal::ZERO);
            CircuitBreakerStatus::blocked(
                self.name(),
                format!(
                    "today's profit ${} is {}% of total ${} (limit {}%)",
                    today.round_dp(2),
                    (share * Decimal::ONE_HUNDRED).round_dp(1),
                    self.total_profit.round_dp(2),
                    (self.config.threshold * Decimal::ONE_HUNDRED).round_dp(1)
                ),
            )
        };
        status
            .with_detail("enabled", self.enabled)
            .with_detail("today_profit", today.round_dp(2))
            .with_detail("total_profit", self.total_profit.round_dp(2))
    }
}
