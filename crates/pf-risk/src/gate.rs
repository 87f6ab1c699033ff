//! Risk gate.
//!
//! The single entry point every caller must pass before acting on a setup.
//! `evaluate` runs a fixed sequence and stops at the first failing step:
//!
//! 1. Push the current balance into the budget ledger
//! 2. Circuit breakers (all blockers collected, not short-circuited)
//! 3. Position sizer
//! 4. Setup self-consistency
//! 5. Daily-loss cap (may reduce size; rejects only below one contract)
//! 6. Consistency forward check on the capped reward
//! 7. Approve with full details
//!
//! Step 5 does not re-run margin, rule or reward/risk checks on the reduced
//! size. Rejections are returned as decisions, never as errors.

use chrono::{DateTime, Utc};
use pf_core::{AccountMode, InstrumentSpec, TradeSetup};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::breakers::{CircuitBreakers, MasterCircuitBreakerStatus};
use crate::budget::{BudgetLedger, BudgetSnapshot};
use crate::config::RiskConfig;
use crate::error::RiskResult;
use crate::sizer::PositionSizer;

/// Per-evaluation observability snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionDetails {
    pub current_balance: Decimal,
    pub remaining_buffer: Decimal,
    pub budget_used_pct: Decimal,
    pub risk_multiplier: Decimal,
    pub max_contracts_by_risk: u32,
    pub max_contracts_by_margin: u32,
    pub max_contracts_by_rule: u32,
    pub max_contracts_by_daily: u32,
    pub remaining_daily_buffer: Decimal,
    pub account_mode: AccountMode,
}

/// Output of `RiskGate::evaluate`. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub approved: bool,
    pub contracts: u32,
    pub total_risk: Decimal,
    pub total_reward: Decimal,
    pub risk_reward_ratio: Decimal,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub blocked_by: Vec<String>,
    pub details: DecisionDetails,
}

impl TradeDecision {
    fn rejected(reasons: Vec<String>, warnings: Vec<String>, details: DecisionDetails) -> Self {
        Self {
            approved: false,
            contracts: 0,
            total_risk: Decimal::ZERO,
            total_reward: Decimal::ZERO,
            risk_reward_ratio: Decimal::ZERO,
            reasons,
            warnings,
            blocked_by: Vec::new(),
            details,
        }
    }

    /// First reason, or an empty string.
    pub fn primary_reason(&self) -> &str {
        self.reasons.first().map(String::as_str).unwrap_or("")
    }
}

/// Dashboard view of the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateStatus {
    pub instrument: String,
    pub budget: BudgetSnapshot,
    pub breakers: MasterCircuitBreakerStatus,
    pub remaining_daily_buffer: Decimal,
}

/// Orchestrates ledger, sizer and breakers for one instrument.
#[derive(Debug, Clone)]
pub struct RiskGate {
    spec: InstrumentSpec,
    ledger: BudgetLedger,
    sizer: PositionSizer,
    breakers: CircuitBreakers,
}

impl RiskGate {
    pub fn new(
        config: &RiskConfig,
        spec: InstrumentSpec,
        started_at: DateTime<Utc>,
    ) -> RiskResult<Self> {
        config.validate()?;
        spec.validate()?;
        Ok(Self {
            spec,
            ledger: BudgetLedger::new(config),
            sizer: PositionSizer::new(config),
            breakers: CircuitBreakers::from_config(config, started_at)?,
        })
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    /// Mutable access for recovery, which replays prior trades.
    pub fn breakers_mut(&mut self) -> &mut CircuitBreakers {
        &mut self.breakers
    }

    pub fn evaluate(
        &mut self,
        setup: &TradeSetup,
        now: DateTime<Utc>,
        current_balance: Decimal,
    ) -> TradeDecision {
        // 1. balance
        self.ledger.update_balance(current_balance);
        let mut details = self.base_details(now);

        // 2. breakers
        let status = self.breakers.check(now);
        let warnings = status.warnings.clone();
        if !status.can_trade {
            let mut decision = TradeDecision::rejected(status.reasons, warnings, details);
            decision.blocked_by = status.blocked_by;
            debug!(
                instrument = %setup.instrument,
                blocked_by = ?decision.blocked_by,
                "Risk gate: blocked by circuit breakers"
            );
            return decision;
        }

        // 3. sizing
        let sizing = self.sizer.size(setup, &self.spec, &self.ledger);
        details.risk_multiplier = sizing.risk_multiplier;
        details.max_contracts_by_risk = sizing.max_contracts_by_risk;
        details.max_contracts_by_margin = sizing.max_contracts_by_margin;
        details.max_contracts_by_rule = sizing.max_contracts_by_rule;
        if !sizing.approved {
            debug!(
                instrument = %setup.instrument,
                reasons = ?sizing.reasons,
                "Risk gate: sizer rejected"
            );
            return TradeDecision::rejected(sizing.reasons, warnings, details);
        }

        // 4. setup consistency
        if let Err(e) = setup.validate() {
            debug!(instrument = %setup.instrument, error = %e, "Risk gate: invalid setup");
            return TradeDecision::rejected(vec![e.to_string()], warnings, details);
        }

        // 5. daily-loss cap
        let risk_per_contract = sizing.risk_per_contract;
        let remaining_daily = self.breakers.daily_loss.remaining(now);
        let max_by_daily = (remaining_daily / risk_per_contract)
            .floor()
            .to_u32()
            .unwrap_or(0);
        details.max_contracts_by_daily = max_by_daily;
        if max_by_daily == 0 {
            let reason = format!(
                "remaining daily loss buffer ${} is below one contract's risk ${}",
                remaining_daily.round_dp(2),
                risk_per_contract.round_dp(2)
            );
            debug!(instrument = %setup.instrument, %reason, "Risk gate: daily cap rejected");
            return TradeDecision::rejected(vec![reason], warnings, details);
        }

        let mut reasons = sizing.reasons.clone();
        let mut contracts = sizing.contracts;
        if contracts > max_by_daily {
            reasons.push(format!(
                "reduced from {contracts} to {max_by_daily} contract(s) by daily loss buffer ${}",
                remaining_daily.round_dp(2)
            ));
            contracts = max_by_daily;
        }
        let qty = Decimal::from(contracts);
        let total_risk = risk_per_contract * qty;
        let total_reward = self.spec.points_to_currency(setup.reward_per_unit()) * qty;

        // 6. consistency forward check
        if self
            .breakers
            .consistency
            .would_violate_consistency(total_reward, now)
        {
            let reason = format!(
                "potential reward ${} would break the consistency rule",
                total_reward.round_dp(2)
            );
            debug!(instrument = %setup.instrument, %reason, "Risk gate: consistency rejected");
            return TradeDecision::rejected(vec![reason], warnings, details);
        }

        // 7. approve
        let decision = TradeDecision {
            approved: true,
            contracts,
            total_risk,
            total_reward,
            risk_reward_ratio: sizing.risk_reward_ratio,
            reasons,
            warnings,
            blocked_by: Vec::new(),
            details,
        };
        info!(
            instrument = %setup.instrument,
            direction = %setup.direction,
            setup_type = %setup.setup_type,
            contracts,
            total_risk = %total_risk.round_dp(2),
            total_reward = %total_reward.round_dp(2),
            "Risk gate: approved"
        );
        decision
    }

    fn base_details(&self, now: DateTime<Utc>) -> DecisionDetails {
        DecisionDetails {
            current_balance: self.ledger.current_balance(),
            remaining_buffer: self.ledger.remaining_buffer(),
            budget_used_pct: self.ledger.budget_used_pct(),
            risk_multiplier: self.ledger.risk_multiplier(),
            remaining_daily_buffer: self.breakers.daily_loss.remaining(now),
            account_mode: self.ledger.mode(),
            ..DecisionDetails::default()
        }
    }

    /// Record a realised trade in every breaker and the ledger.
    ///
    /// Call exactly once per closed trade.
    pub fn record_trade_result(&mut self, pnl: Decimal, at: DateTime<Utc>) {
        self.breakers.record_trade_result(pnl, at);
        self.ledger.apply_pnl(pnl);
    }

    pub fn status(&self, now: DateTime<Utc>) -> GateStatus {
        GateStatus {
            instrument: self.spec.symbol.clone(),
            budget: self.ledger.snapshot(),
            breakers: self.breakers.check(now),
            remaining_daily_buffer: self.breakers.daily_loss.remaining(now),
        }
    }
}
