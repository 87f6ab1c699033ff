//! Position and closed-trade records.

use std::fmt;

use chrono::{DateTime, Utc};
use pf_core::{BracketIds, Direction, ExitProfile, InstrumentSpec, PositionView, Price, TradeSetup};
use pf_persistence::TradeEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "target")]
    Target,
    /// Stopped out at the entry price after the breakeven move.
    #[serde(rename = "breakeven")]
    Breakeven,
    /// Stopped out by a stop that trailed past the entry price.
    #[serde(rename = "trail")]
    Trail,
    #[serde(rename = "time-exit")]
    TimeExit,
    /// Venue reported flat while the entry was confirmed.
    #[serde(rename = "reconcile")]
    Reconcile,
    /// Venue reported flat and the entry never filled.
    #[serde(rename = "reconcile-no-fill")]
    ReconcileNoFill,
    #[serde(rename = "flatten")]
    Flatten,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Target => "target",
            Self::Breakeven => "breakeven",
            Self::Trail => "trail",
            Self::TimeExit => "time-exit",
            Self::Reconcile => "reconcile",
            Self::ReconcileNoFill => "reconcile-no-fill",
            Self::Flatten => "flatten",
        }
    }

    /// Parse the label written to the event log.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "stop" => Self::Stop,
            "target" => Self::Target,
            "breakeven" => Self::Breakeven,
            "trail" => Self::Trail,
            "time-exit" => Self::TimeExit,
            "reconcile" => Self::Reconcile,
            "reconcile-no-fill" => Self::ReconcileNoFill,
            "flatten" => Self::Flatten,
            _ => return None,
        })
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit management settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Move the stop to entry once price has run this many ATRs.
    #[serde(default = "default_breakeven_atr_multiple")]
    pub breakeven_atr_multiple: Decimal,
    #[serde(default = "default_breakeven_enabled")]
    pub breakeven_enabled: bool,
    /// Close at the bar close after this many bars in the trade.
    #[serde(default)]
    pub max_hold_bars: Option<usize>,
}

fn default_breakeven_atr_multiple() -> Decimal {
    Decimal::ONE
}

fn default_breakeven_enabled() -> bool {
    true
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            breakeven_atr_multiple: default_breakeven_atr_multiple(),
            breakeven_enabled: default_breakeven_enabled(),
            max_hold_bars: None,
        }
    }
}

/// The single position an instrument may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub direction: Direction,
    /// Planned entry until the fill is confirmed, then the fill price.
    pub entry_price: Price,
    /// Only ever moves in the trade's favor.
    pub stop: Price,
    pub target: Price,
    pub contracts: u32,
    /// Currency risk of one contract at the initial stop.
    pub risk_per_contract: Decimal,
    pub entry_time: DateTime<Utc>,
    pub entry_bar_index: usize,
    pub setup_type: String,
    pub exit_profile: ExitProfile,
    /// Highest high (long) or lowest low (short) since entry.
    pub trailing_extreme: Option<Price>,
    pub breakeven_armed: bool,
    pub entry_confirmed: bool,
    pub orders: BracketIds,
}

impl Position {
    pub fn from_setup(
        setup: &TradeSetup,
        spec: &InstrumentSpec,
        contracts: u32,
        orders: BracketIds,
        entry_time: DateTime<Utc>,
        entry_bar_index: usize,
    ) -> Self {
        Self {
            instrument: setup.instrument.clone(),
            direction: setup.direction,
            entry_price: setup.entry,
            stop: setup.stop,
            target: setup.target,
            contracts,
            risk_per_contract: spec.points_to_currency(setup.risk_per_unit()),
            entry_time,
            entry_bar_index,
            setup_type: setup.setup_type.clone(),
            exit_profile: setup.exit_profile,
            trailing_extreme: None,
            breakeven_armed: false,
            entry_confirmed: false,
            orders,
        }
    }

    /// Realized P&L if closed at `exit`:
    /// `(exit - entry) * sign * point_value * contracts`.
    pub fn pnl_at(&self, exit: Price, point_value: Decimal) -> Decimal {
        (exit - self.entry_price) * self.direction.sign() * point_value * Decimal::from(self.contracts)
    }

    /// Whether `candidate` is a strictly better stop.
    pub fn improves_stop(&self, candidate: Price) -> bool {
        match self.direction {
            Direction::Long => candidate > self.stop,
            Direction::Short => candidate < self.stop,
            Direction::None => false,
        }
    }

    /// Move the stop if `candidate` improves it. Returns the old stop on change.
    pub fn improve_stop(&mut self, candidate: Price) -> Option<Price> {
        if !self.improves_stop(candidate) {
            return None;
        }
        let old = self.stop;
        self.stop = candidate;
        Some(old)
    }

    /// Label for a stop fill at the current stop level.
    pub fn stop_exit_reason(&self) -> ExitReason {
        let locked_in = self.direction.favorable_move(self.entry_price, self.stop);
        if locked_in > Decimal::ZERO {
            ExitReason::Trail
        } else if locked_in.is_zero() && self.breakeven_armed {
            ExitReason::Breakeven
        } else {
            ExitReason::Stop
        }
    }

    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.entry_bar_index)
    }

    pub fn view(&self, bar_index: usize) -> PositionView {
        PositionView {
            instrument: self.instrument.clone(),
            direction: self.direction,
            entry_price: self.entry_price,
            stop: self.stop,
            target: self.target,
            contracts: self.contracts,
            entry_time: self.entry_time,
            bars_held: self.bars_held(bar_index),
            setup_type: self.setup_type.clone(),
            exit_profile: self.exit_profile,
            trailing_extreme: self.trailing_extreme,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {} @ {}", self.direction, self.contracts, self.entry_price)
    }
}

/// Immutable record of one round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub instrument: String,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Price,
    pub exit_price: Price,
    pub contracts: u32,
    pub pnl: Decimal,
    pub exit_reason: ExitReason,
    pub setup_type: String,
    pub exit_profile: ExitProfile,
    pub entry_bar_index: usize,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    /// Event log form of this trade.
    pub fn to_event(&self) -> TradeEvent {
        TradeEvent::Exit {
            direction: self.direction,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            contracts: self.contracts,
            pnl: self.pnl,
            reason: self.exit_reason.to_string(),
            entry_time: self.entry_time,
            setup_type: self.setup_type.clone(),
            exit_profile: self.exit_profile,
        }
    }
}

/// A stop move made during exit management, for the live worker to push
/// to the venue and the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct StopUpdate {
    pub old_stop: Price,
    pub new_stop: Price,
    pub reason: String,
}
