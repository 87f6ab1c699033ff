//! Fill-quality simulation.
//!
//! Each trade independently resolves to one of three outcomes: the limit
//! entry fills at modeled cost, the entry is missed (no trade), or the entry
//! chases with a market order and pays extra slippage. Repeating this over
//! the whole ledger estimates sensitivity to execution quality, separately
//! from price-path risk.

use pf_backtest::BacktestTrade;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::costs::CostModel;
use crate::error::{require_trades, RobustnessError, RobustnessResult};
use crate::monte_carlo::to_f64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillModel {
    /// Probability the limit entry fills at modeled cost.
    #[serde(default = "default_limit_fill_rate")]
    pub limit_fill_rate: f64,
    /// Probability the entry is missed entirely.
    #[serde(default = "default_miss_rate")]
    pub miss_rate: f64,
    /// Extra slippage, in ticks, when the entry is chased with a market
    /// order. The market outcome takes the remaining probability.
    #[serde(default = "default_market_extra_ticks")]
    pub market_extra_ticks: Decimal,
}

fn default_limit_fill_rate() -> f64 {
    0.75
}

fn default_miss_rate() -> f64 {
    0.15
}

fn default_market_extra_ticks() -> Decimal {
    Decimal::TWO
}

impl Default for FillModel {
    fn default() -> Self {
        Self {
            limit_fill_rate: default_limit_fill_rate(),
            miss_rate: default_miss_rate(),
            market_extra_ticks: default_market_extra_ticks(),
        }
    }
}

impl FillModel {
    pub fn market_rate(&self) -> f64 {
        1.0 - self.limit_fill_rate - self.miss_rate
    }

    pub fn validate(&self) -> RobustnessResult<()> {
        let rates = [self.limit_fill_rate, self.miss_rate];
        if rates.iter().any(|r| !(0.0..=1.0).contains(r)) || self.market_rate() < -1e-9 {
            return Err(RobustnessError::Config(format!(
                "fill probabilities must be in [0, 1] and sum to at most 1 (limit {}, miss {})",
                self.limit_fill_rate, self.miss_rate
            )));
        }
        if self.market_extra_ticks < Decimal::ZERO {
            return Err(RobustnessError::Config(
                "market_extra_ticks must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    fn draw(&self, rng: &mut StdRng) -> FillOutcome {
        let u: f64 = rng.gen();
        if u < self.limit_fill_rate {
            FillOutcome::Limit
        } else if u < self.limit_fill_rate + self.miss_rate {
            FillOutcome::Missed
        } else {
            FillOutcome::Market
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillOutcome {
    Limit,
    Missed,
    Market,
}

pub struct FillSimulator {
    pub model: FillModel,
    pub costs: CostModel,
    pub iterations: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub iterations: usize,
    pub trades: usize,
    /// Net P&L with every entry filled at modeled cost.
    pub baseline_pnl: f64,
    pub average_pnl: f64,
    pub worst_pnl: f64,
    pub best_pnl: f64,
    /// Filled entries over attempted entries, across all iterations.
    pub fill_rate: f64,
}

impl FillReport {
    /// Average shortfall against the all-filled baseline.
    pub fn execution_drag(&self) -> f64 {
        self.baseline_pnl - self.average_pnl
    }
}

impl FillSimulator {
    pub fn new(model: FillModel, costs: CostModel, iterations: usize, seed: u64) -> Self {
        Self {
            model,
            costs,
            iterations,
            seed,
        }
    }

    pub fn run(&self, trades: &[BacktestTrade]) -> RobustnessResult<FillReport> {
        require_trades(trades, "fill simulator")?;
        self.model.validate()?;
        if self.iterations == 0 {
            return Err(RobustnessError::Config(
                "fill simulator iterations must be positive".to_string(),
            ));
        }

        let limit_net: Vec<Decimal> = trades
            .iter()
            .map(|t| t.pnl - self.costs.trade_cost(t, Decimal::ONE))
            .collect();
        let market_net: Vec<Decimal> = trades
            .iter()
            .zip(&limit_net)
            .map(|(t, net)| {
                *net - self.model.market_extra_ticks * self.costs.tick_value * Decimal::from(t.contracts)
            })
            .collect();
        let baseline = to_f64(limit_net.iter().copied().sum());

        let mut master = StdRng::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.iterations).map(|_| master.gen()).collect();

        let outcomes: Vec<(Decimal, usize)> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut pnl = Decimal::ZERO;
                let mut filled = 0usize;
                for i in 0..trades.len() {
                    match self.model.draw(&mut rng) {
                        FillOutcome::Limit => {
                            pnl += limit_net[i];
                            filled += 1;
                        }
                        FillOutcome::Market => {
                            pnl += market_net[i];
                            filled += 1;
                        }
                        FillOutcome::Missed => {}
                    }
                }
                (pnl, filled)
            })
            .collect();

        let pnls: Vec<f64> = outcomes.iter().map(|(pnl, _)| to_f64(*pnl)).collect();
        let total_filled: usize = outcomes.iter().map(|(_, filled)| filled).sum();
        let average_pnl = pnls.iter().sum::<f64>() / pnls.len() as f64;
        let worst_pnl = pnls.iter().copied().fold(f64::INFINITY, f64::min);
        let best_pnl = pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let fill_rate = total_filled as f64 / (self.iterations * trades.len()) as f64;

        info!(
            iterations = self.iterations,
            trades = trades.len(),
            baseline_pnl = baseline,
            average_pnl,
            worst_pnl,
            fill_rate,
            "Fill simulation complete"
        );

        Ok(FillReport {
            iterations: self.iterations,
            trades: trades.len(),
            baseline_pnl: baseline,
            average_pnl,
            worst_pnl,
            best_pnl,
            fill_rate,
        })
    }
}
