//! Transaction cost model and slippage sensitivity.
//!
//! Backtest P&L is gross. Costs are applied here, per contract:
//! `round_trip = slippage_per_fill * 2 * multiplier + commission`.

use pf_backtest::BacktestTrade;
use pf_core::InstrumentSpec;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{require_trades, RobustnessError, RobustnessResult};

/// Upper bound for the break-even search.
const MAX_MULTIPLIER: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
const SEARCH_STEPS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Slippage for one fill of one contract, in currency.
    pub slippage_per_fill: Decimal,
    /// Commission and fees for one round trip of one contract.
    pub commission_round_trip: Decimal,
    /// Value of one tick, used to price extra slippage in ticks.
    pub tick_value: Decimal,
}

impl CostModel {
    pub fn from_spec(spec: &InstrumentSpec) -> Self {
        Self {
            slippage_per_fill: spec.slippage_per_fill(),
            commission_round_trip: spec.commission_round_trip,
            tick_value: spec.tick_value(),
        }
    }

    /// Round-trip cost of one contract with slippage scaled by `multiplier`.
    pub fn round_trip_cost(&self, multiplier: Decimal) -> Decimal {
        self.slippage_per_fill * Decimal::TWO * multiplier + self.commission_round_trip
    }

    pub fn trade_cost(&self, trade: &BacktestTrade, multiplier: Decimal) -> Decimal {
        self.round_trip_cost(multiplier) * Decimal::from(trade.contracts)
    }

    pub fn apply(&self, trades: &[BacktestTrade], multiplier: Decimal) -> RobustnessResult<NetResult> {
        require_trades(trades, "cost model")?;
        Ok(self.net(trades, multiplier))
    }

    fn net(&self, trades: &[BacktestTrade], multiplier: Decimal) -> NetResult {
        let mut gross = Decimal::ZERO;
        let mut costs = Decimal::ZERO;
        let mut net_winners = 0usize;
        for trade in trades {
            let cost = self.trade_cost(trade, multiplier);
            gross += trade.pnl;
            costs += cost;
            if trade.pnl - cost > Decimal::ZERO {
                net_winners += 1;
            }
        }
        let net = gross - costs;
        NetResult {
            multiplier,
            trades: trades.len(),
            gross_pnl: gross,
            total_costs: costs,
            net_pnl: net,
            avg_net_per_trade: net / Decimal::from(trades.len()),
            net_win_rate: net_winners as f64 / trades.len() as f64,
        }
    }

    /// Slippage multiplier at which net P&L crosses zero.
    ///
    /// `Some(0)` when the ledger already loses money at zero slippage, `None`
    /// when slippage cannot push it below zero (no slippage modeled, or the
    /// crossing lies beyond the search bound).
    pub fn break_even_multiplier(&self, trades: &[BacktestTrade]) -> RobustnessResult<Option<Decimal>> {
        require_trades(trades, "break-even search")?;

        if self.net(trades, Decimal::ZERO).net_pnl <= Decimal::ZERO {
            return Ok(Some(Decimal::ZERO));
        }
        if self.net(trades, MAX_MULTIPLIER).net_pnl > Decimal::ZERO {
            return Ok(None);
        }

        let mut lo = Decimal::ZERO;
        let mut hi = MAX_MULTIPLIER;
        for _ in 0..SEARCH_STEPS {
            let mid = (lo + hi) / Decimal::TWO;
            if self.net(trades, mid).net_pnl > Decimal::ZERO {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let multiplier = hi.round_dp(4);
        debug!(%multiplier, "Break-even slippage multiplier found");
        Ok(Some(multiplier))
    }

    /// Net results at each multiplier, in the order given.
    pub fn sensitivity(
        &self,
        trades: &[BacktestTrade],
        multipliers: &[Decimal],
    ) -> RobustnessResult<Vec<NetResult>> {
        require_trades(trades, "cost sensitivity")?;
        if multipliers.iter().any(|m| *m < Decimal::ZERO) {
            return Err(RobustnessError::Config(
                "slippage multipliers must be non-negative".to_string(),
            ));
        }
        Ok(multipliers.iter().map(|m| self.net(trades, *m)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetResult {
    pub multiplier: Decimal,
    pub trades: usize,
    pub gross_pnl: Decimal,
    pub total_costs: Decimal,
    pub net_pnl: Decimal,
    pub avg_net_per_trade: Decimal,
    pub net_win_rate: f64,
}

impl NetResult {
    pub fn is_profitable(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}
