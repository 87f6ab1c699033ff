use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CircuitBreaker, CircuitBreakerStatus};

/// Configuration for the consecutive-loss cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Consecutive losses before the cooldown triggers.
    pub max_consecutive_losses: u32,
    /// Cooldown length in seconds, measured from the triggering loss.
    pub cooldown_secs: i64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 2,
            cooldown_secs: 2 * 60 * 60,
        }
    }
}

/// Blocks trading for a fixed period after consecutive losing trades.
///
/// A win or breakeven resets the counter immediately but does not clear a
/// cooldown that is already running. The counter restarts from zero when a
/// cooldown begins.
#[derive(Debug, Clone)]
pub struct StrategyCooldownBreaker {
    config: CooldownConfig,
    consecutive_losses: u32,
    cooldown_until: Option<DateTime<Utc>>,
}

impl StrategyCooldownBreaker {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            consecutive_losses: 0,
            cooldown_until: None,
        }
    }

    pub fn record_trade(&mut self, pnl: Decimal, at: DateTime<Utc>) {
        if pnl < Decimal::ZERO {
            self.record_loss(at);
        } else {
            self.record_win();
        }
    }

    pub fn record_loss(&mut self, at: DateTime<Utc>) {
        self.consecutive_losses += 1;
        if self.consecutive_losses >= self.config.max_consecutive_losses {
            let until = at + Duration::seconds(self.config.cooldown_secs);
            self.cooldown_until = Some(until);
            warn!(
                consecutive = self.consecutive_losses,
                cooldown_secs = self.config.cooldown_secs,
                %until,
                "Strategy cooldown triggered after consecutive losses"
            );
            self.consecutive_losses = 0;
        }
    }

    pub fn record_win(&mut self) {
        self.consecutive_losses = 0;
    }

    #[inline]
    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    #[inline]
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    pub fn is_in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

impl CircuitBreaker for StrategyCooldownBreaker {
    fn name(&self) -> &'static str {
        "strategy_cooldown"
    }

    fn can_trade(&self, now: DateTime<Utc>) -> bool {
        !self.is_in_cooldown(now)
    }

    fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        let status = match self.cooldown_until {
            Some(until) if now < until => {
                let mins = (until - now).num_minutes();
                CircuitBreakerStatus::blocked(
                    self.name(),
                    format!("cooling down after consecutive losses, {mins} min left"),
                )
                .with_detail("cooldown_until", until)
            }
            _ => CircuitBreakerStatus::ok(self.name()),
        };
        status.with_detail("consecutive_losses", self.consecutive_losses)
    }
}
