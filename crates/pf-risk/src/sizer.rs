//! Position sizer.
//!
//! Pure function of (setup, instrument, ledger): no state, no retries.
//! Callers re-invoke per bar as inputs change.

use pf_core::{InstrumentSpec, TradeSetup};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::BudgetLedger;
use crate::config::RiskConfig;

/// Outcome of one sizing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingDecision {
    pub approved: bool,
    pub contracts: u32,
    /// Stop distance × point value.
    pub risk_per_contract: Decimal,
    /// Remaining buffer × risk multiplier.
    pub risk_budget: Decimal,
    pub risk_multiplier: Decimal,
    pub max_contracts_by_risk: u32,
    pub max_contracts_by_margin: u32,
    pub max_contracts_by_rule: u32,
    pub total_risk: Decimal,
    pub total_reward: Decimal,
    pub risk_reward_ratio: Decimal,
    pub reasons: Vec<String>,
}

impl SizingDecision {
    fn reject(mut self, reason: String) -> Self {
        self.approved = false;
        self.contracts = 0;
        self.total_risk = Decimal::ZERO;
        self.total_reward = Decimal::ZERO;
        self.reasons.push(reason);
        self
    }
}

/// floor(numerator / denominator) as a contract count; zero on a
/// non-positive denominator.
fn floor_contracts(numerator: Decimal, denominator: Decimal) -> u32 {
    if denominator <= Decimal::ZERO || numerator <= Decimal::ZERO {
        return 0;
    }
    (numerator / denominator).floor().to_u32().unwrap_or(u32::MAX)
}

/// Contract sizing against risk, margin and rule caps.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    margin_utilization_cap: Decimal,
    max_contracts_per_trade: u32,
    max_single_contract_buffer_fraction: Decimal,
    min_reward_risk: Decimal,
    max_contracts_by_rule: u32,
}

impl PositionSizer {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            margin_utilization_cap: config.margin_utilization_cap,
            max_contracts_per_trade: config.max_contracts_per_trade,
            max_single_contract_buffer_fraction: config.max_single_contract_buffer_fraction,
            min_reward_risk: config.min_reward_risk,
            max_contracts_by_rule: config.rules().max_contracts_by_rule,
        }
    }

    pub fn size(
        &self,
        setup: &TradeSetup,
        spec: &InstrumentSpec,
        ledger: &BudgetLedger,
    ) -> SizingDecision {
        let risk_per_contract = spec.points_to_currency(setup.risk_per_unit());
        let reward_per_contract = spec.points_to_currency(setup.reward_per_unit());
        let remaining = ledger.remaining_buffer();
        let multiplier = ledger.risk_multiplier();
        let risk_budget = remaining * multiplier;
        let risk_reward_ratio = setup.reward_risk_ratio();

        let max_by_risk = floor_contracts(risk_budget, risk_per_contract);
        let max_by_margin = floor_contracts(
            ledger.current_balance() * self.margin_utilization_cap,
            spec.typical_margin,
        );
        let max_by_rule = self.max_contracts_by_rule;

        let min = max_by_risk.min(max_by_margin).min(max_by_rule);
        let contracts = min.min(self.max_contracts_per_trade);

        let decision = SizingDecision {
            approved: true,
            contracts,
            risk_per_contract,
            risk_budget,
            risk_multiplier: multiplier,
            max_contracts_by_risk: max_by_risk,
            max_contracts_by_margin: max_by_margin,
            max_contracts_by_rule: max_by_rule,
            total_risk: risk_per_contract * Decimal::from(contracts),
            total_reward: reward_per_contract * Decimal::from(contracts),
            risk_reward_ratio,
            reasons: Vec::new(),
        };

        if risk_per_contract <= Decimal::ZERO {
            return decision.reject("risk per contract is zero".to_string());
        }

        if contracts == 0 {
            return decision.reject(format!(
                "position size is zero: by risk {max_by_risk} (budget ${} / ${} per contract), by margin {max_by_margin}, by rule {max_by_rule}",
                risk_budget.round_dp(2),
                risk_per_contract.round_dp(2),
            ));
        }

        let single_cap = remaining * self.max_single_contract_buffer_fraction;
        if risk_per_contract > single_cap {
            return decision.reject(format!(
                "single-contract risk ${} exceeds {}% of remaining buffer ${}",
                risk_per_contract.round_dp(2),
                (self.max_single_contract_buffer_fraction * Decimal::ONE_HUNDRED).round_dp(0),
                remaining.round_dp(2),
            ));
        }

        if risk_reward_ratio < self.min_reward_risk {
            return decision.reject(format!(
                "reward/risk {} below minimum {}",
                risk_reward_ratio.round_dp(2),
                self.min_reward_risk
            ));
        }

        let mut decision = decision;
        decision.reasons.push(format!(
            "sized {contracts} contract(s): risk ${} reward ${} R:R {}",
            decision.total_risk.round_dp(2),
            decision.total_reward.round_dp(2),
            risk_reward_ratio.round_dp(2)
        ));
        decision
    }
}
