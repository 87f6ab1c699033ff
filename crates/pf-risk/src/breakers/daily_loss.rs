use chrono::{DateTime, NaiveDate, Utc};
use pf_core::VenueClock;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::{CircuitBreaker, CircuitBreakerStatus};

/// Blocks trading once today's cumulative loss reaches the daily limit.
///
/// "Today" is the venue calendar day. Roll-over is observed lazily: any
/// call with a venue date later than the last recorded one sees zero loss,
/// so the predicate stays pure.
#[derive(Debug, Clone)]
pub struct DailyLossBreaker {
    limit: Decimal,
    clock: VenueClock,
    current_date: Option<NaiveDate>,
    loss: Decimal,
    trades: u32,
}

impl DailyLossBreaker {
    pub fn new(limit: Decimal, clock: VenueClock) -> Self {
        Self {
            limit,
            clock,
            current_date: None,
            loss: Decimal::ZERO,
            trades: 0,
        }
    }

    #[inline]
    pub fn limit(&self) -> Decimal {
        self.limit
    }

    fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.current_date == Some(self.clock.venue_date(now))
    }

    fn roll(&mut self, at: DateTime<Utc>) {
        let date = self.clock.venue_date(at);
        match self.current_date {
            Some(current) if date <= current => {}
            previous => {
                if previous.is_some() && self.loss > Decimal::ZERO {
                    info!(
                        previous = ?previous,
                        %date,
                        loss = %self.loss,
                        "Daily loss reset on new venue day"
                    );
                }
                self.current_date = Some(date);
                self.loss = Decimal::ZERO;
                self.trades = 0;
            }
        }
    }

    /// Record a realised trade. Only losses accumulate.
    pub fn record_trade(&mut self, pnl: Decimal, at: DateTime<Utc>) {
        self.roll(at);
        self.trades += 1;
        if pnl < Decimal::ZERO {
            self.add_loss(-pnl);
        }
    }

    /// Record a loss amount (positive number).
    pub fn record_loss(&mut self, amount: Decimal, at: DateTime<Utc>) {
        self.roll(at);
        self.trades += 1;
        self.add_loss(amount.abs());
    }

    fn add_loss(&mut self, amount: Decimal) {
        self.loss += amount;
        if self.loss >= self.limit {
            warn!(
                loss = %self.loss,
                limit = %self.limit,
                "Daily loss limit reached"
            );
        }
    }

    /// Loss recorded for the venue day containing `now`.
    pub fn today_loss(&self, now: DateTime<Utc>) -> Decimal {
        if self.is_current(now) {
            self.loss
        } else {
            Decimal::ZERO
        }
    }

    pub fn trades_today(&self, now: DateTime<Utc>) -> u32 {
        if self.is_current(now) {
            self.trades
        } else {
            0
        }
    }

    /// Loss that can still be taken today. Never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Decimal {
        (self.limit - self.today_loss(now)).max(Decimal::ZERO)
    }

    /// Dry run: would losing `potential_loss` more exceed the limit?
    pub fn would_breach(&self, potential_loss: Decimal, now: DateTime<Utc>) -> bool {
        self.today_loss(now) + potential_loss.abs() > self.limit
    }
}

impl CircuitBreaker for DailyLossBreaker {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    fn can_trade(&self, now: DateTime<Utc>) -> bool {
        self.today_loss(now) < self.limit
    }

    fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        let loss = self.today_loss(now);
        let status = if self.can_trade(now) {
            CircuitBreakerStatus::ok(self.name())
        } else {
            CircuitBreakerStatus::blocked(
                self.name(),
                format!(
                    "daily loss ${} reached limit ${}",
                    loss.round_dp(2),
                    self.limit.round_dp(2)
                ),
            )
        };
        status
            .with_detail("today_loss", loss.round_dp(2))
            .with_detail("limit", self.limit)
            .with_detail("remaining", self.remaining(now).round_dp(2))
            .with_detail("venue_date", self.clock.venue_date(now))
    }
}
