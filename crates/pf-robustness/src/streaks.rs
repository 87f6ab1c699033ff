//! Worst-case streak and period finder.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use pf_backtest::BacktestTrade;
use pf_core::VenueClock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{require_trades, RobustnessError, RobustnessResult};

/// A maximal run of consecutive losing trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossStreak {
    /// Index of the first trade in the ledger.
    pub start_index: usize,
    /// Index of the last trade, inclusive.
    pub end_index: usize,
    pub length: usize,
    /// Summed loss magnitude (positive).
    pub total_loss: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPnl {
    pub date: NaiveDate,
    pub pnl: Decimal,
    pub trades: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPnl {
    pub iso_year: i32,
    pub week: u32,
    pub pnl: Decimal,
    pub trades: usize,
}

/// Maximal losing runs ranked by total loss, largest first.
///
/// Ties keep ledger order. Breakeven trades end a run.
pub fn find_worst_streaks(trades: &[BacktestTrade], top_n: usize) -> RobustnessResult<Vec<LossStreak>> {
    require_trades(trades, "streak finder")?;

    let mut streaks = Vec::new();
    let mut current: Option<LossStreak> = None;
    for (i, trade) in trades.iter().enumerate() {
        if trade.is_loss() {
            let streak = current.get_or_insert_with(|| LossStreak {
                start_index: i,
                end_index: i,
                length: 0,
                total_loss: Decimal::ZERO,
                start_time: trade.entry_time,
                end_time: trade.exit_time,
            });
            streak.end_index = i;
            streak.length += 1;
            streak.total_loss -= trade.pnl;
            streak.end_time = trade.exit_time;
        } else if let Some(done) = current.take() {
            streaks.push(done);
        }
    }
    streaks.extend(current);

    // stable sort keeps ledger order on ties
    streaks.sort_by(|a, b| b.total_loss.cmp(&a.total_loss));
    streaks.truncate(top_n);
    Ok(streaks)
}

/// Venue day with the lowest summed P&L, by exit time.
pub fn worst_day(trades: &[BacktestTrade], clock: &VenueClock) -> RobustnessResult<DayPnl> {
    let mut days: BTreeMap<NaiveDate, (Decimal, usize)> = BTreeMap::new();
    for trade in trades {
        let slot = days
            .entry(clock.venue_date(trade.exit_time))
            .or_insert((Decimal::ZERO, 0));
        slot.0 += trade.pnl;
        slot.1 += 1;
    }
    let (date, (pnl, count)) = lowest(days).ok_or(RobustnessError::InsufficientTrades {
        analysis: "worst day",
    })?;
    Ok(DayPnl {
        date,
        pnl,
        trades: count,
    })
}

/// ISO week (venue calendar) with the lowest summed P&L, by exit time.
pub fn worst_week(trades: &[BacktestTrade], clock: &VenueClock) -> RobustnessResult<WeekPnl> {
    let mut weeks: BTreeMap<(i32, u32), (Decimal, usize)> = BTreeMap::new();
    for trade in trades {
        let slot = weeks
            .entry(clock.iso_week(trade.exit_time))
            .or_insert((Decimal::ZERO, 0));
        slot.0 += trade.pnl;
        slot.1 += 1;
    }
    let ((iso_year, week), (pnl, count)) = lowest(weeks).ok_or(
        RobustnessError::InsufficientTrades {
            analysis: "worst week",
        },
    )?;
    Ok(WeekPnl {
        iso_year,
        week,
        pnl,
        trades: count,
    })
}

/// Bucket with the lowest P&L; the earliest key wins a tie.
fn lowest<K: Ord>(buckets: BTreeMap<K, (Decimal, usize)>) -> Option<(K, (Decimal, usize))> {
    buckets
        .into_iter()
        .reduce(|best, next| if next.1 .0 < best.1 .0 { next } else { best })
}
