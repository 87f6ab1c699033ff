//! Risk gating for the prop-futures control plane.
//!
//! Turns a candidate `TradeSetup` into an approved or rejected
//! `TradeDecision`:
//! - `BudgetLedger`: total-loss buffer and risk-multiplier tiers
//! - `PositionSizer`: risk, margin and rule caps
//! - `CircuitBreakers`: DailyLoss, Consistency, MarketHours, Inactivity,
//!   StrategyCooldown
//! - `RiskGate`: the fixed evaluation sequence tying them together

pub mod breakers;
pub mod budget;
pub mod config;
pub mod error;
pub mod gate;
pub mod sizer;

pub use breakers::{
    BlackoutWindow, CircuitBreaker, CircuitBreakerStatus, CircuitBreakers, ConsistencyBreaker,
    ConsistencyConfig, CooldownConfig, DailyLossBreaker, InactivityBreaker, InactivityConfig,
    InactivitySeverity, MarketHoursBreaker, MarketHoursConfig, MasterCircuitBreakerStatus,
    StrategyCooldownBreaker,
};
pub use budget::{max_total_loss, risk_multiplier, BudgetLedger, BudgetSnapshot};
pub use config::{ModeRules, RiskConfig, RiskTier};
pub use error::{RiskError, RiskResult};
pub use gate::{DecisionDetails, GateStatus, RiskGate, TradeDecision};
pub use sizer::{PositionSizer, SizingDecision};
