//! Budget ledger.
//!
//! Tracks starting/current balance for one account and answers "how much
//! can still be lost before the program's hard limit is hit".

use pf_core::AccountMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{ModeRules, RiskConfig};

/// Maximum tolerable total loss for a mode.
///
/// Challenge and FundedPrePayout use the fixed `hard_cap`. FundedPostPayout
/// uses `current_balance - hard_cap`, where `hard_cap` is the balance floor.
#[must_use]
pub fn max_total_loss(
    mode: AccountMode,
    _starting_balance: Decimal,
    current_balance: Decimal,
    hard_cap: Decimal,
) -> Decimal {
    match mode {
        AccountMode::Challenge | AccountMode::FundedPrePayout => hard_cap,
        AccountMode::FundedPostPayout => current_balance - hard_cap,
    }
}

/// Fraction of the buffer to risk per trade for a buffer-remaining ratio.
///
/// Walks the descending tiers and returns the first whose threshold is met;
/// below every threshold the last (most conservative) tier applies.
#[must_use]
pub fn risk_multiplier(buffer_remaining_ratio: Decimal, rules: &ModeRules) -> Decimal {
    rules
        .risk_tiers
        .iter()
        .find(|tier| buffer_remaining_ratio >= tier.min_remaining_ratio)
        .or_else(|| rules.risk_tiers.last())
        .map(|tier| tier.multiplier)
        .unwrap_or(Decimal::ZERO)
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub mode: AccountMode,
    pub starting_balance: Decimal,
    pub current_balance: Decimal,
    pub peak_balance: Decimal,
    pub max_total_loss: Decimal,
    pub remaining_buffer: Decimal,
    pub budget_used_pct: Decimal,
    pub risk_multiplier: Decimal,
}

/// Balance and loss-buffer tracker.
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    mode: AccountMode,
    starting_balance: Decimal,
    current_balance: Decimal,
    peak_balance: Decimal,
    hard_cap: Decimal,
    rules: ModeRules,
}

impl BudgetLedger {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            mode: config.mode,
            starting_balance: config.starting_balance,
            current_balance: config.starting_balance,
            peak_balance: config.starting_balance,
            hard_cap: config.hard_cap(),
            rules: config.rules().clone(),
        }
    }

    /// Push the latest account balance. The only mutator.
    pub fn update_balance(&mut self, balance: Decimal) {
        self.current_balance = balance;
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
    }

    /// Add a realised P&L to the current balance.
    pub fn apply_pnl(&mut self, pnl: Decimal) {
        self.update_balance(self.current_balance + pnl);
    }

    #[inline]
    pub fn mode(&self) -> AccountMode {
        self.mode
    }

    #[inline]
    pub fn starting_balance(&self) -> Decimal {
        self.starting_balance
    }

    #[inline]
    pub fn current_balance(&self) -> Decimal {
        self.current_balance
    }

    #[inline]
    pub fn peak_balance(&self) -> Decimal {
        self.peak_balance
    }

    pub fn max_total_loss(&self) -> Decimal {
        max_total_loss(
            self.mode,
            self.starting_balance,
            self.current_balance,
            self.hard_cap,
        )
    }

    /// `max(0, max_total_loss - (starting - current))` in every mode.
    /// Never negative.
    pub fn remaining_buffer(&self) -> Decimal {
        let drawdown = self.starting_balance - self.current_balance;
        (self.max_total_loss() - drawdown).max(Decimal::ZERO)
    }

    /// Remaining buffer over max total loss, clamped to [0, 1].
    pub fn buffer_remaining_ratio(&self) -> Decimal {
        let max_loss = self.max_total_loss();
        if max_loss <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.remaining_buffer() / max_loss).clamp(Decimal::ZERO, Decimal::ONE)
    }

    /// Share of the loss buffer already consumed, in percent.
    pub fn budget_used_pct(&self) -> Decimal {
        ((Decimal::ONE - self.buffer_remaining_ratio()) * Decimal::ONE_HUNDRED).round_dp(2)
    }

    pub fn risk_multiplier(&self) -> Decimal {
        risk_multiplier(self.buffer_remaining_ratio(), &self.rules)
    }

    /// Remaining buffer scaled by the current risk multiplier.
    pub fn available_risk_budget(&self) -> Decimal {
        self.remaining_buffer() * self.risk_multiplier()
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            mode: self.mode,
            starting_balance: self.starting_balance,
            current_balance: self.current_balance,
            peak_balance: self.peak_balance,
            max_total_loss: self.max_total_loss(),
            remaining_buffer: self.remaining_buffer(),
            budget_used_pct: self.budget_used_pct(),
            risk_multiplier: self.risk_multiplier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger(mode: AccountMode) -> BudgetLedger {
        BudgetLedger::new(&RiskConfig::for_mode(mode))
    }

    #[test]
    fn test_fresh_challenge_ledger() {
        let l = ledger(AccountMode::Challenge);
        assert_eq!(l.max_total_loss(), dec!(2500));
        assert_eq!(l.remaining_buffer(), dec!(2500));
        assert_eq!(l.buffer_remaining_ratio(), dec!(1));
        assert_eq!(l.risk_multiplier(), dec!(0.50));
        assert_eq!(l.budget_used_pct(), dec!(0));
    }

    #[test]
    fn test_remaining_buffer_never_negative() {
        for mode in [
            AccountMode::Challenge,
            AccountMode::FundedPrePayout,
            AccountMode::FundedPostPayout,
        ] {
            let mut l = ledger(mode);
            for balance in [dec!(0), dec!(10000), dec!(22000), dec!(25000), dec!(31000)] {
                l.update_balance(balance);
                assert!(l.remaining_buffer() >= Decimal::ZERO, "{mode} @ {balance}");
            }
        }
    }

    #[test]
    fn test_profit_grows_buffer_but_ratio_is_clamped() {
        let mut l = ledger(AccountMode::Challenge);
        l.update_balance(dec!(26000));
        assert_eq!(l.remaining_buffer(), dec!(3500));
        assert_eq!(l.buffer_remaining_ratio(), dec!(1));
        assert_eq!(l.peak_balance(), dec!(26000));
    }

    #[test]
    fn test_challenge_tiers() {
        let mut l = ledger(AccountMode::Challenge);
        // 1500 of 2500 remaining -> 0.6 -> second tier
        l.update_balance(dec!(24000));
        assert_eq!(l.remaining_buffer(), dec!(1500));
        assert_eq!(l.risk_multiplier(), dec!(0.40));
        assert_eq!(l.available_risk_budget(), dec!(600));
        assert_eq!(l.budget_used_pct(), dec!(40));

        // 500 remaining -> 0.2 -> bottom tier
        l.update_balance(dec!(23000));
        assert_eq!(l.risk_multiplier(), dec!(0.20));
    }

    #[test]
    fn test_funded_tiers_are_more_conservative() {
        let mut l = ledger(AccountMode::FundedPrePayout);
        assert_eq!(l.risk_multiplier(), dec!(0.40));
        l.update_balance(dec!(22500));
        assert_eq!(l.remaining_buffer(), dec!(0));
        assert_eq!(l.risk_multiplier(), dec!(0.10));
    }

    #[test]
    fn test_post_payout_uses_floor() {
        let mut l = ledger(AccountMode::FundedPostPayout);
        l.update_balance(dec!(27000));
        assert_eq!(l.max_total_loss(), dec!(1900));
        // gains above the starting balance add to the buffer like any mode
        assert_eq!(l.remaining_buffer(), dec!(3900));
        assert_eq!(l.buffer_remaining_ratio(), dec!(1));
        assert_eq!(l.budget_used_pct(), dec!(0));

        l.update_balance(dec!(26000));
        assert_eq!(l.max_total_loss(), dec!(900));
        assert_eq!(l.remaining_buffer(), dec!(1900));

        l.update_balance(dec!(25000));
        assert_eq!(l.remaining_buffer(), dec!(0));
        assert_eq!(l.buffer_remaining_ratio(), dec!(0));
    }

    #[test]
    fn test_risk_multiplier_boundaries() {
        let rules = ModeRules::challenge();
        assert_eq!(risk_multiplier(dec!(0.75), &rules), dec!(0.50));
        assert_eq!(risk_multiplier(dec!(0.7499), &rules), dec!(0.40));
        assert_eq!(risk_multiplier(dec!(0.25), &rules), dec!(0.30));
        assert_eq!(risk_multiplier(dec!(0), &rules), dec!(0.20));
        assert_eq!(risk_multiplier(dec!(-1), &rules), dec!(0.20));
    }
}
