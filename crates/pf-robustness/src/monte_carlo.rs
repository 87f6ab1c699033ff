//! Monte Carlo drawdown resampling.
//!
//! Shuffles the order of the realized trade P&Ls and recomputes max
//! drawdown for each permutation. The multiset of outcomes is unchanged,
//! so the distribution isolates path risk from edge.
//!
//! Each iteration draws from its own `StdRng`, seeded from a master RNG
//! before the parallel section. Results depend only on `seed`, never on how
//! rayon schedules the work.

use pf_backtest::max_drawdown;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{require_trades, RobustnessError, RobustnessResult};

/// Where the actual drawdown sits relative to the resampled median.
const OPTIMISTIC_RATIO: f64 = 0.75;
const PESSIMISTIC_RATIO: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonteCarlo {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_iterations() -> usize {
    1_000
}

fn default_seed() -> u64 {
    42
}

impl Default for MonteCarlo {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed: default_seed(),
        }
    }
}

/// Qualitative reading of the actual drawdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Actual drawdown well below the median: the backtest order was kind,
    /// expect deeper drawdowns live.
    Optimistic,
    Representative,
    /// Actual drawdown well above the median: an unlucky ordering.
    Pessimistic,
}

impl Verdict {
    fn classify(actual: f64, median: f64) -> Self {
        if median <= 0.0 {
            return if actual > 0.0 {
                Verdict::Pessimistic
            } else {
                Verdict::Representative
            };
        }
        let ratio = actual / median;
        if ratio < OPTIMISTIC_RATIO {
            Verdict::Optimistic
        } else if ratio > PESSIMISTIC_RATIO {
            Verdict::Pessimistic
        } else {
            Verdict::Representative
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownDistribution {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl DrawdownDistribution {
    /// Summarize an ascending-sorted, non-empty sample.
    fn from_sorted(sorted: &[f64]) -> Self {
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        Self {
            mean,
            median,
            p95: percentile(sorted, 0.95),
            p99: percentile(sorted, 0.99),
            min: sorted[0],
            max: sorted[n - 1],
        }
    }
}

/// Nearest-rank percentile of an ascending-sorted, non-empty sample.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub iterations: usize,
    pub seed: u64,
    pub trades: usize,
    pub actual_drawdown: f64,
    pub distribution: DrawdownDistribution,
    /// Share of permutations whose drawdown is at or below the actual one.
    pub actual_percentile: f64,
    pub verdict: Verdict,
    #[serde(skip)]
    drawdowns: Vec<f64>,
}

impl MonteCarloReport {
    /// Share of permutations whose drawdown reaches `limit`.
    pub fn breach_probability(&self, limit: f64) -> f64 {
        if self.drawdowns.is_empty() {
            return 0.0;
        }
        let first_breach = self.drawdowns.partition_point(|dd| *dd < limit);
        (self.drawdowns.len() - first_breach) as f64 / self.drawdowns.len() as f64
    }

    /// Resampled drawdowns, ascending.
    pub fn drawdowns(&self) -> &[f64] {
        &self.drawdowns
    }
}

/// Max drawdown of the running balance after each P&L, in order.
pub fn path_drawdown(pnls: &[Decimal], starting_balance: Decimal) -> Decimal {
    let curve = std::iter::once(starting_balance).chain(pnls.iter().scan(
        starting_balance,
        |balance, pnl| {
            *balance += *pnl;
            Some(*balance)
        },
    ));
    max_drawdown(curve)
}

/// One resampled ordering of `pnls`, fully determined by `seed`.
pub fn permute(pnls: &[Decimal], seed: u64) -> Vec<Decimal> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = pnls.to_vec();
    shuffled.shuffle(&mut rng);
    shuffled
}

impl MonteCarlo {
    pub fn new(iterations: usize, seed: u64) -> Self {
        Self { iterations, seed }
    }

    pub fn run(&self, pnls: &[Decimal], starting_balance: Decimal) -> RobustnessResult<MonteCarloReport> {
        require_trades(pnls, "monte carlo")?;
        if self.iterations == 0 {
            return Err(RobustnessError::Config(
                "monte carlo iterations must be positive".to_string(),
            ));
        }

        let actual = to_f64(path_drawdown(pnls, starting_balance));

        let mut master = StdRng::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.iterations).map(|_| master.gen()).collect();

        let mut drawdowns: Vec<f64> = seeds
            .par_iter()
            .map(|&seed| to_f64(path_drawdown(&permute(pnls, seed), starting_balance)))
            .collect();
        drawdowns.sort_by(f64::total_cmp);

        let distribution = DrawdownDistribution::from_sorted(&drawdowns);
        let at_or_below = drawdowns.partition_point(|dd| *dd <= actual);
        let actual_percentile = at_or_below as f64 / drawdowns.len() as f64;
        let verdict = Verdict::classify(actual, distribution.median);

        info!(
            iterations = self.iterations,
            trades = pnls.len(),
            actual_drawdown = actual,
            median = distribution.median,
            p95 = distribution.p95,
            ?verdict,
            "Monte Carlo drawdown resampling complete"
        );

        Ok(MonteCarloReport {
            iterations: self.iterations,
            seed: self.seed,
            trades: pnls.len(),
            actual_drawdown: actual,
            distribution,
            actual_percentile,
            verdict,
            drawdowns,
        })
    }
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pnls() -> Vec<Decimal> {
        vec![
            dec!(100),
            dec!(-50),
            dec!(80),
            dec!(-50),
            dec!(-50),
            dec!(120),
            dec!(-40),
            dec!(60),
            dec!(-30),
            dec!(90),
        ]
    }

    #[test]
    fn test_path_drawdown_peak_to_trough() {
        let dd = path_drawdown(&[dec!(100), dec!(-30), dec!(-50), dec!(200), dec!(-10)], dec!(1000));
        assert_eq!(dd, dec!(80));
    }

    #[test]
    fn test_permutation_keeps_every_outcome() {
        let mut expected = pnls();
        expected.sort();
        let total: Decimal = expected.iter().sum();

        let mut master = StdRng::seed_from_u64(11);
        let mut reordered = 0;
        for _ in 0..20 {
            let shuffled = permute(&pnls(), master.gen());
            assert_eq!(shuffled.iter().sum::<Decimal>(), total);
            if shuffled != pnls() {
                reordered += 1;
            }
            let mut sorted = shuffled;
            sorted.sort();
            assert_eq!(sorted, expected);
        }
        assert!(reordered > 0);
    }

    #[test]
    fn test_permute_is_deterministic_per_seed() {
        assert_eq!(permute(&pnls(), 5), permute(&pnls(), 5));
        assert!(permute(&[], 5).is_empty());
    }

    #[test]
    fn test_same_seed_same_distribution() {
        let mc = MonteCarlo::new(500, 7);
        let a = mc.run(&pnls(), dec!(25000)).unwrap();
        let b = mc.run(&pnls(), dec!(25000)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.drawdowns(), b.drawdowns());
    }

    #[test]
    fn test_distribution_bounds() {
        let report = MonteCarlo::new(2000, 1).run(&pnls(), dec!(25000)).unwrap();
        let d = report.distribution;
        // all three losers bunched together is the worst ordering
        assert!(d.max <= 220.0 + 1e-9);
        assert!(d.min >= 50.0 - 1e-9);
        assert!(d.min <= d.median && d.median <= d.p95 && d.p95 <= d.p99 && d.p99 <= d.max);
        assert!((0.0..=1.0).contains(&report.actual_percentile));
    }

    #[test]
    fn test_breach_probability_monotone() {
        let report = MonteCarlo::new(1000, 3).run(&pnls(), dec!(25000)).unwrap();
        assert_eq!(report.breach_probability(0.0), 1.0);
        assert_eq!(report.breach_probability(1e9), 0.0);
        assert!(report.breach_probability(100.0) >= report.breach_probability(150.0));
    }

    #[test]
    fn test_all_winners_have_zero_drawdown() {
        let report = MonteCarlo::new(50, 9)
            .run(&[dec!(10), dec!(20), dec!(5)], dec!(1000))
            .unwrap();
        assert_eq!(report.distribution.max, 0.0);
        assert_eq!(report.verdict, Verdict::Representative);
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = MonteCarlo::default().run(&[], dec!(1000)).unwrap_err();
        assert!(matches!(err, RobustnessError::InsufficientTrades { .. }));
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.95), 95.0);
        assert_eq!(percentile(&sorted, 0.99), 99.0);
        assert_eq!(percentile(&[5.0], 0.99), 5.0);
    }

    #[test]
    fn test_verdict_classify() {
        assert_eq!(Verdict::classify(50.0, 100.0), Verdict::Optimistic);
        assert_eq!(Verdict::classify(100.0, 100.0), Verdict::Representative);
        assert_eq!(Verdict::classify(150.0, 100.0), Verdict::Pessimistic);
    }
}
