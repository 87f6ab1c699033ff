//! Robustness analysis of completed backtest ledgers.
//!
//! - `MonteCarlo`: drawdown distribution over trade-order permutations
//! - `CostModel`: net P&L under slippage and commission, break-even search
//! - `find_worst_streaks`, `worst_day`, `worst_week`
//! - `FillSimulator`: sensitivity to entry fill quality
//!
//! Randomness is seeded and confined to this crate; it never feeds back
//! into trade selection.

pub mod costs;
pub mod error;
pub mod fills;
pub mod monte_carlo;
pub mod streaks;

pub use costs::{CostModel, NetResult};
pub use error::{RobustnessError, RobustnessResult};
pub use fills::{FillModel, FillReport, FillSimulator};
pub use monte_carlo::{
    path_drawdown, permute, DrawdownDistribution, MonteCarlo, MonteCarloReport, Verdict,
};
pub use streaks::{find_worst_streaks, worst_day, worst_week, DayPnl, LossStreak, WeekPnl};

use pf_backtest::BacktestResult;
use pf_core::InstrumentSpec;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Settings for a full robustness pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessConfig {
    #[serde(default)]
    pub monte_carlo: MonteCarlo,
    #[serde(default)]
    pub fills: FillModel,
    #[serde(default = "default_fill_iterations")]
    pub fill_iterations: usize,
    #[serde(default = "default_cost_multipliers")]
    pub cost_multipliers: Vec<Decimal>,
    #[serde(default = "default_top_streaks")]
    pub top_streaks: usize,
}

fn default_fill_iterations() -> usize {
    1_000
}

fn default_cost_multipliers() -> Vec<Decimal> {
    [0, 1, 2, 3, 5].into_iter().map(Decimal::from).collect()
}

fn default_top_streaks() -> usize {
    5
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            monte_carlo: MonteCarlo::default(),
            fills: FillModel::default(),
            fill_iterations: default_fill_iterations(),
            cost_multipliers: default_cost_multipliers(),
            top_streaks: default_top_streaks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessReport {
    pub monte_carlo: MonteCarloReport,
    pub cost_sensitivity: Vec<NetResult>,
    pub break_even_multiplier: Option<Decimal>,
    pub worst_streaks: Vec<LossStreak>,
    pub worst_day: DayPnl,
    pub worst_week: WeekPnl,
    pub fills: FillReport,
}

/// Run every analysis over one backtest result.
pub fn analyze(
    result: &BacktestResult,
    spec: &InstrumentSpec,
    config: &RobustnessConfig,
) -> RobustnessResult<RobustnessReport> {
    let trades = &result.trades;
    let costs = CostModel::from_spec(spec);

    let monte_carlo = config.monte_carlo.run(&result.pnls(), result.starting_balance)?;
    let cost_sensitivity = costs.sensitivity(trades, &config.cost_multipliers)?;
    let break_even_multiplier = costs.break_even_multiplier(trades)?;
    let worst_streaks = find_worst_streaks(trades, config.top_streaks)?;
    let day = worst_day(trades, &result.clock)?;
    let week = worst_week(trades, &result.clock)?;
    let fills = FillSimulator::new(
        config.fills.clone(),
        costs,
        config.fill_iterations,
        config.monte_carlo.seed,
    )
    .run(trades)?;

    Ok(RobustnessReport {
        monte_carlo,
        cost_sensitivity,
        break_even_multiplier,
        worst_streaks,
        worst_day: day,
        worst_week: week,
        fills,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pf_backtest::BacktestTrade;
    use pf_core::{Direction, Price};
    use pf_position::ExitReason;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub fn trade_at(exit_time: DateTime<Utc>, pnl: Decimal) -> BacktestTrade {
        BacktestTrade {
            entry_time: exit_time - Duration::minutes(30),
            exit_time,
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

    /// The `index`-th trade of a ledger, one hour apart.
    pub fn trade(index: usize, pnl: Decimal, contracts: u32) -> BacktestTrade {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
        let mut t = trade_at(start + Duration::hours(index as i64), pnl);
        t.contracts = contracts;
        t
    }
}
