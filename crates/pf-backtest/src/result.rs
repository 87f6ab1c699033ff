//! Backtest output and derived metrics.
//!
//! Only the trade ledger, equity curve and rejection histogram are stored.
//! Every metric is recomputed from them on demand.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use pf_core::{Direction, Price, VenueClock};
use pf_position::{ClosedTrade, ExitReason};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One closed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Price,
    pub exit_price: Price,
    pub direction: Direction,
    pub contracts: u32,
    pub pnl: Decimal,
    pub exit_reason: ExitReason,
    pub setup_type: String,
    pub entry_bar: usize,
    pub exit_bar: usize,
}

impl BacktestTrade {
    pub fn from_closed(trade: &ClosedTrade, exit_bar: usize) -> Self {
        Self {
            entry_time: trade.entry_time,
            exit_time: trade.exit_time,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            direction: trade.direction,
            contracts: trade.contracts,
            pnl: trade.pnl,
            exit_reason: trade.exit_reason,
            setup_type: trade.setup_type.clone(),
            entry_bar: trade.entry_bar_index,
            exit_bar,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }
}

/// Running balance after a closed trade (or the start of the run).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
}

/// Peak-to-current shortfall, maximized over the whole curve.
pub fn max_drawdown(balances: impl IntoIterator<Item = Decimal>) -> Decimal {
    let mut peak: Option<Decimal> = None;
    let mut max_dd = Decimal::ZERO;
    for balance in balances {
        let p = peak.map_or(balance, |p| p.max(balance));
        peak = Some(p);
        max_dd = max_dd.max(p - balance);
    }
    max_dd
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub instrument: String,
    pub starting_balance: Decimal,
    pub clock: VenueClock,
    pub first_bar: Option<DateTime<Utc>>,
    pub last_bar: Option<DateTime<Utc>>,
    pub bars_processed: usize,
    pub signals_seen: usize,
    pub trades: Vec<BacktestTrade>,
    pub equity_curve: Vec<EquityPoint>,
    /// Rejection count keyed by the truncated first reason.
    pub rejections: BTreeMap<String, u32>,
}

impl BacktestResult {
    pub fn new(instrument: &str, starting_balance: Decimal, clock: VenueClock) -> Self {
        Self {
            instrument: instrument.to_string(),
            starting_balance,
            clock,
            first_bar: None,
            last_bar: None,
            bars_processed: 0,
            signals_seen: 0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            rejections: BTreeMap::new(),
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn total_pnl(&self) -> Decimal {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn final_balance(&self) -> Decimal {
        self.starting_balance + self.total_pnl()
    }

    pub fn pnls(&self) -> Vec<Decimal> {
        self.trades.iter().map(|t| t.pnl).collect()
    }

    /// Winning share of trades, 0 when there are none.
    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let wins = self.trades.iter().filter(|t| t.is_win()).count();
        wins as f64 / self.trades.len() as f64
    }

    /// Gross profit over gross loss. `None` without any losing trade.
    pub fn profit_factor(&self) -> Option<f64> {
        let gross_profit: Decimal = self.trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).sum();
        let gross_loss: Decimal = self.trades.iter().filter(|t| t.is_loss()).map(|t| -t.pnl).sum();
        if gross_loss.is_zero() {
            return None;
        }
        (gross_profit / gross_loss).to_f64()
    }

    pub fn max_drawdown(&self) -> Decimal {
        max_drawdown(self.equity_curve.iter().map(|p| p.balance))
    }

    /// Summed P&L per venue day of exit.
    pub fn daily_pnl(&self) -> BTreeMap<NaiveDate, Decimal> {
        let mut days = BTreeMap::new();
        for trade in &self.trades {
            *days
                .entry(self.clock.venue_date(trade.exit_time))
                .or_insert(Decimal::ZERO) += trade.pnl;
        }
        days
    }

    /// Magnitude of the worst net day, 0 when no day lost money.
    pub fn largest_daily_loss(&self) -> Decimal {
        self.daily_pnl()
            .values()
            .copied()
            .min()
            .filter(|pnl| *pnl < Decimal::ZERO)
            .map_or(Decimal::ZERO, |pnl| -pnl)
    }

    /// Magnitude of the worst single trade, 0 without losers.
    pub fn largest_single_loss(&self) -> Decimal {
        self.trades
            .iter()
            .map(|t| t.pnl)
            .min()
            .filter(|pnl| *pnl < Decimal::ZERO)
            .map_or(Decimal::ZERO, |pnl| -pnl)
    }

    pub fn max_consecutive_losses(&self) -> usize {
        let mut best = 0;
        let mut run = 0;
        for trade in &self.trades {
            if trade.is_loss() {
                run += 1;
                best = best.max(run);
            } else {
                run = 0;
            }
        }
        best
    }

    /// Longest stretch of venue days without a new entry, counting from the
    /// first bar and up to the last bar.
    pub fn max_idle_days(&self) -> i64 {
        let (Some(first), Some(last)) = (self.first_bar, self.last_bar) else {
            return 0;
        };
        let mut marks = Vec::with_capacity(self.trades.len() + 2);
        marks.push(first);
        marks.extend(self.trades.iter().map(|t| t.entry_time));
        marks.push(last);

        marks
            .windows(2)
            .map(|w| self.clock.days_between(w[0], w[1]))
            .max()
            .unwrap_or(0)
            .max(0)
    }

    /// Rejection reasons, most frequent first.
    pub fn top_rejections(&self, n: usize) -> Vec<(String, u32)> {
        let mut items: Vec<(String, u32)> = self
            .rejections
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        items.truncate(n);
        items
    }

    pub fn exit_reason_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for trade in &self.trades {
            *counts.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> BacktestSummary {
        BacktestSummary {
            instrument: self.instrument.clone(),
            bars: self.bars_processed,
            signals: self.signals_seen,
            trades: self.trade_count(),
            win_rate: self.win_rate(),
            profit_factor: self.profit_factor(),
            total_pnl: self.total_pnl(),
            starting_balance: self.starting_balance,
            final_balance: self.final_balance(),
            max_drawdown: self.max_drawdown(),
            largest_daily_loss: self.largest_daily_loss(),
            largest_single_loss: self.largest_single_loss(),
            max_consecutive_losses: self.max_consecutive_losses(),
            max_idle_days: self.max_idle_days(),
            exit_reasons: self.exit_reason_counts(),
            top_rejections: self.top_rejections(10),
        }
    }
}

/// Flat report of a run's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub instrument: String,
    pub bars: usize,
    pub signals: usize,
    pub trades: usize,
    pub win_rate: f64,
    pub profit_factor: Option<f64>,
    pub total_pnl: Decimal,
    pub starting_balance: Decimal,
    pub final_balance: Decimal,
    pub max_drawdown: Decimal,
    pub largest_daily_loss: Decimal,
    pub largest_single_loss: Decimal,
    pub max_consecutive_losses: usize,
    pub max_idle_days: i64,
    pub exit_reasons: BTreeMap<String, usize>,
    pub top_rejections: Vec<(String, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour + 5, 0, 0).unwrap()
    }

    fn trade(day: u32, hour: u32, pnl: Decimal) -> BacktestTrade {
        BacktestTrade {
            entry_time: t(day, hour),
            exit_time: t(day, hour) + Duration::minutes(30),
            entry_price: Price::new(dec!(5000)),
            exit_price: Price::new(dec!(5000)),
            direction: Direction::Long,
            contracts: 1,
            pnl,
            exit_reason: if pnl < Decimal::ZERO {
                ExitReason::Stop
            } else {
                ExitReason::Target
            },
            setup_type: "test".to_string(),
            entry_bar: 0,
            exit_bar: 6,
        }
    }

    fn result_with(trades: Vec<BacktestTrade>) -> BacktestResult {
        let mut result = BacktestResult::new("MES", dec!(25000), VenueClock::default());
        result.first_bar = Some(t(3, 9));
        result.last_bar = Some(t(14, 16));
        let mut balance = result.starting_balance;
        result.equity_curve.push(EquityPoint {
            timestamp: t(3, 9),
            balance,
        });
        for tr in &trades {
            balance += tr.pnl;
            result.equity_curve.push(EquityPoint {
                timestamp: tr.exit_time,
                balance,
            });
        }
        result.trades = trades;
        result
    }

    #[test]
    fn test_max_drawdown_is_worst_not_final() {
        let curve = [dec!(100), dec!(120), dec!(90), dec!(130), dec!(125)];
        assert_eq!(max_drawdown(curve), dec!(30));
        assert_eq!(max_drawdown(Vec::<Decimal>::new()), Decimal::ZERO);
    }

    #[test]
    fn test_metrics() {
        let result = result_with(vec![
            trade(4, 10, dec!(100)),
            trade(4, 11, dec!(-50)),
            trade(4, 12, dec!(-60)),
            trade(5, 10, dec!(200)),
            trade(5, 11, dec!(-40)),
        ]);
        assert_eq!(result.total_pnl(), dec!(150));
        assert_eq!(result.final_balance(), dec!(25150));
        assert!((result.win_rate() - 0.4).abs() < 1e-9);
        assert!((result.profit_factor().unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(result.max_drawdown(), dec!(110));
        assert_eq!(result.largest_daily_loss(), Decimal::ZERO);
        assert_eq!(result.largest_single_loss(), dec!(60));
        assert_eq!(result.max_consecutive_losses(), 2);
    }

    #[test]
    fn test_largest_daily_loss() {
        let result = result_with(vec![
            trade(4, 10, dec!(-50)),
            trade(4, 11, dec!(-60)),
            trade(5, 10, dec!(30)),
        ]);
        assert_eq!(result.largest_daily_loss(), dec!(110));
        assert!(result.profit_factor().is_some());
    }

    #[test]
    fn test_no_losses_profit_factor_none() {
        let result = result_with(vec![trade(4, 10, dec!(10))]);
        assert_eq!(result.profit_factor(), None);
    }

    #[test]
    fn test_max_idle_days_includes_edges() {
        // first bar on the 3rd, trades on the 4th and 5th, last bar on the 14th
        let result = result_with(vec![trade(4, 10, dec!(10)), trade(5, 10, dec!(-10))]);
        assert_eq!(result.max_idle_days(), 9);
    }

    #[test]
    fn test_summary_serializes() {
        let mut result = result_with(vec![trade(4, 10, dec!(-10))]);
        result.rejections.insert("blocked by market_hours".to_string(), 3);
        result.rejections.insert("position size is zero".to_string(), 5);
        let summary = result.summary();
        assert_eq!(summary.top_rejections[0].0, "position size is zero");
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"max_drawdown\""));
    }
}
