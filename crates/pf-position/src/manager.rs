//! Per-instrument position state machine.
//!
//! `Flat -> PendingEntry -> Open -> Flat`. At most one position per
//! instrument. The manager owns that position exclusively; callers feed it
//! fills, bars and venue reports and get closed trades back.

use chrono::{DateTime, Utc};
use pf_core::{Bar, BracketIds, Direction, ExitAction, ExitProfile, InstrumentSpec, Price, TradeSetup};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{PositionError, PositionResult};
use crate::position::{ClosedTrade, ExitConfig, ExitReason, Position, StopUpdate};

/// Lifecycle state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    /// Entry submitted, fill not confirmed.
    PendingEntry(Position),
    /// Entry confirmed; stop and target are live.
    Open(Position),
}

impl PositionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::PendingEntry(_) => "pending_entry",
            Self::Open(_) => "open",
        }
    }
}

pub struct PositionManager {
    spec: InstrumentSpec,
    exit_config: ExitConfig,
    state: PositionState,
    /// Set after restoring from the event log until the first reconcile.
    needs_reconcile: bool,
    stop_updates: Vec<StopUpdate>,
}

impl PositionManager {
    pub fn new(spec: InstrumentSpec, exit_config: ExitConfig) -> Self {
        Self {
            spec,
            exit_config,
            state: PositionState::Flat,
            needs_reconcile: false,
            stop_updates: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.spec.symbol
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn position(&self) -> Option<&Position> {
        match &self.state {
            PositionState::Flat => None,
            PositionState::PendingEntry(p) | PositionState::Open(p) => Some(p),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, PositionState::Flat)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PositionState::Open(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, PositionState::PendingEntry(_))
    }

    pub fn needs_reconcile(&self) -> bool {
        self.needs_reconcile
    }

    pub(crate) fn set_needs_reconcile(&mut self, value: bool) {
        self.needs_reconcile = value;
    }

    pub(crate) fn state_mut(&mut self) -> &mut PositionState {
        &mut self.state
    }

    pub(crate) fn set_state(&mut self, state: PositionState) {
        self.state = state;
    }

    /// Stop moves made since the last call.
    pub fn drain_stop_updates(&mut self) -> Vec<StopUpdate> {
        std::mem::take(&mut self.stop_updates)
    }

    fn check_admissible(&self, setup: &TradeSetup, contracts: u32) -> PositionResult<()> {
        if !self.is_flat() {
            return Err(PositionError::InvalidState(format!(
                "{}: cannot open while {}",
                self.spec.symbol,
                self.state.label()
            )));
        }
        if setup.instrument != self.spec.symbol {
            return Err(PositionError::InvalidState(format!(
                "setup for {} routed to {} manager",
                setup.instrument, self.spec.symbol
            )));
        }
        if contracts == 0 {
            return Err(PositionError::InvalidState(
                "cannot open a zero-contract position".to_string(),
            ));
        }
        setup.validate()?;
        Ok(())
    }

    /// Record a submitted entry that has not filled yet.
    pub fn open_pending(
        &mut self,
        setup: &TradeSetup,
        contracts: u32,
        orders: BracketIds,
        now: DateTime<Utc>,
        bar_index: usize,
    ) -> PositionResult<()> {
        self.check_admissible(setup, contracts)?;
        let position = Position::from_setup(setup, &self.spec, contracts, orders, now, bar_index);
        info!(
            instrument = %self.spec.symbol,
            direction = %position.direction,
            contracts,
            entry = %position.entry_price,
            stop = %position.stop,
            target = %position.target,
            "Entry pending"
        );
        self.state = PositionState::PendingEntry(position);
        Ok(())
    }

    /// Entry fill confirmed by the venue.
    ///
    /// The entry price becomes the fill price; stop and target stay where
    /// the setup put them. A repeated confirmation of an open position is
    /// ignored.
    pub fn confirm_entry(&mut self, fill_price: Price, at: DateTime<Utc>) -> PositionResult<()> {
        match std::mem::take(&mut self.state) {
            PositionState::PendingEntry(mut position) => {
                position.entry_price = fill_price;
                position.entry_time = at;
                position.entry_confirmed = true;
                info!(
                    instrument = %self.spec.symbol,
                    fill = %fill_price,
                    contracts = position.contracts,
                    "Entry filled"
                );
                self.state = PositionState::Open(position);
                Ok(())
            }
            PositionState::Open(position) => {
                debug!(instrument = %self.spec.symbol, "Duplicate entry fill ignored");
                self.state = PositionState::Open(position);
                Ok(())
            }
            PositionState::Flat => Err(PositionError::InvalidState(format!(
                "{}: entry fill while flat",
                self.spec.symbol
            ))),
        }
    }

    /// Open directly at a known fill. Used by the backtest, where the entry
    /// fills at the signal bar.
    pub fn open_filled(
        &mut self,
        setup: &TradeSetup,
        contracts: u32,
        fill_price: Price,
        at: DateTime<Utc>,
        bar_index: usize,
    ) -> PositionResult<()> {
        self.check_admissible(setup, contracts)?;
        let mut position =
            Position::from_setup(setup, &self.spec, contracts, BracketIds::default(), at, bar_index);
        position.entry_price = fill_price;
        position.entry_confirmed = true;
        self.state = PositionState::Open(position);
        Ok(())
    }

    /// Drop a pending entry that the venue rejected or cancelled.
    pub fn abandon_entry(&mut self, reason: &str) -> Option<Position> {
        match std::mem::take(&mut self.state) {
            PositionState::PendingEntry(position) => {
                warn!(instrument = %self.spec.symbol, reason, "Pending entry abandoned");
                Some(position)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Close the open position.
    pub fn close(
        &mut self,
        exit_price: Price,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> PositionResult<ClosedTrade> {
        match std::mem::take(&mut self.state) {
            PositionState::Open(position) => Ok(self.finish(position, exit_price, reason, at)),
            other => {
                let label = other.label();
                self.state = other;
                Err(PositionError::InvalidState(format!(
                    "{}: close requested while {label}",
                    self.spec.symbol
                )))
            }
        }
    }

    pub(crate) fn finish(
        &self,
        position: Position,
        exit_price: Price,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> ClosedTrade {
        let pnl = position.pnl_at(exit_price, self.spec.point_value);
        info!(
            instrument = %self.spec.symbol,
            direction = %position.direction,
            entry = %position.entry_price,
            exit = %exit_price,
            contracts = position.contracts,
            %pnl,
            reason = %reason,
            "Position closed"
        );
        ClosedTrade {
            instrument: position.instrument,
            direction: position.direction,
            entry_time: position.entry_time,
            exit_time: at,
            entry_price: position.entry_price,
            exit_price,
            contracts: position.contracts,
            pnl,
            exit_reason: reason,
            setup_type: position.setup_type,
            exit_profile: position.exit_profile,
            entry_bar_index: position.entry_bar_index,
        }
    }

    /// Run exit management for one bar.
    ///
    /// Order: intrabar stop, then target (the stop wins when a bar touches
    /// both), then strategy advice, then the bar-count time exit, then the
    /// breakeven move and the trend-ride trail. Stop moves take effect from
    /// the next bar.
    pub fn on_bar(&mut self, bar: &Bar, bar_index: usize, advice: ExitAction) -> Option<ClosedTrade> {
        if !self.is_open() {
            return None;
        }
        let PositionState::Open(mut position) = std::mem::take(&mut self.state) else {
            return None;
        };
        let at = bar.timestamp;

        if let Some(fill) = stop_fill(&position, bar) {
            let reason = position.stop_exit_reason();
            return Some(self.finish(position, fill, reason, at));
        }
        if target_touched(&position, bar) {
            let target = position.target;
            return Some(self.finish(position, target, ExitReason::Target, at));
        }

        match advice {
            ExitAction::Hold => {}
            ExitAction::Stop(price) => {
                return Some(self.finish(position, price.unwrap_or(bar.close), ExitReason::Stop, at));
            }
            ExitAction::Target(price) => {
                return Some(self.finish(position, price.unwrap_or(bar.close), ExitReason::Target, at));
            }
            ExitAction::TimeExit(price) => {
                return Some(self.finish(position, price.unwrap_or(bar.close), ExitReason::TimeExit, at));
            }
            ExitAction::Breakeven => {
                let entry = position.entry_price;
                if self.move_stop(&mut position, entry, "breakeven") {
                    position.breakeven_armed = true;
                }
            }
            ExitAction::Trail(price) => {
                self.move_stop(&mut position, price, "strategy trail");
            }
        }

        if let Some(max_bars) = self.exit_config.max_hold_bars {
            if position.bars_held(bar_index) >= max_bars {
                let close = bar.close;
                return Some(self.finish(position, close, ExitReason::TimeExit, at));
            }
        }

        self.apply_breakeven(&mut position, bar);
        self.apply_trail(&mut position, bar);

        self.state = PositionState::Open(position);
        None
    }

    fn move_stop(&mut self, position: &mut Position, candidate: Price, reason: &str) -> bool {
        let candidate = candidate.round_to_tick(self.spec.tick_size);
        match position.improve_stop(candidate) {
            Some(old_stop) => {
                debug!(
                    instrument = %self.spec.symbol,
                    old = %old_stop,
                    new = %candidate,
                    reason,
                    "Stop moved"
                );
                self.stop_updates.push(StopUpdate {
                    old_stop,
                    new_stop: candidate,
                    reason: reason.to_string(),
                });
                true
            }
            None => false,
        }
    }

    fn apply_breakeven(&mut self, position: &mut Position, bar: &Bar) {
        if !self.exit_config.breakeven_enabled || position.breakeven_armed {
            return;
        }
        let unit = bar
            .indicators
            .atr
            .filter(|atr| *atr > Decimal::ZERO)
            .unwrap_or_else(|| position.risk_per_contract / self.spec.point_value);
        let trigger = unit * self.exit_config.breakeven_atr_multiple;
        let best = match position.direction {
            Direction::Long => bar.high,
            Direction::Short => bar.low,
            Direction::None => return,
        };
        if position.direction.favorable_move(position.entry_price, best) >= trigger {
            position.breakeven_armed = true;
            let entry = position.entry_price;
            self.move_stop(position, entry, "breakeven");
        }
    }

    fn apply_trail(&mut self, position: &mut Position, bar: &Bar) {
        let ExitProfile::TrendRide { trail_distance } = position.exit_profile else {
            return;
        };
        let extreme = match (position.direction, position.trailing_extreme) {
            (Direction::Long, Some(prev)) => prev.max(bar.high),
            (Direction::Long, None) => bar.high,
            (Direction::Short, Some(prev)) => prev.min(bar.low),
            (Direction::Short, None) => bar.low,
            (Direction::None, _) => return,
        };
        position.trailing_extreme = Some(extreme);
        let candidate = extreme - trail_distance * position.direction.sign();
        self.move_stop(position, candidate, "trail");
    }
}

/// Fill price if the bar reached the stop. A bar that opens through the
/// stop fills at the open.
fn stop_fill(position: &Position, bar: &Bar) -> Option<Price> {
    match position.direction {
        Direction::Long if bar.low <= position.stop => Some(bar.open.min(position.stop)),
        Direction::Short if bar.high >= position.stop => Some(bar.open.max(position.stop)),
        _ => None,
    }
}

fn target_touched(position: &Position, bar: &Bar) -> bool {
    match position.direction {
        Direction::Long => bar.high >= position.target,
        Direction::Short => bar.low <= position.target,
        Direction::None => false,
    }
}
