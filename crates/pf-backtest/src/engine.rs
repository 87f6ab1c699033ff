//! Deterministic bar replay.
//!
//! One pass over an ordered bar sequence. At each bar the open position is
//! managed first, then a new entry is considered through the risk gate.
//! The generator only ever sees `bars[..=i]`. No wall clock, no randomness:
//! two runs over the same input produce identical results.

use pf_core::{Bar, InstrumentSpec, SignalGenerator};
use pf_position::{ClosedTrade, ExitReason, PositionManager};
use pf_risk::RiskGate;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::{BacktestConfig, REJECTION_KEY_LEN};
use crate::error::{BacktestError, EngineResult};
use crate::result::{BacktestResult, BacktestTrade, EquityPoint};

pub struct BacktestEngine {
    config: BacktestConfig,
    spec: InstrumentSpec,
    generator: Box<dyn SignalGenerator>,
}

impl BacktestEngine {
    pub fn new(
        config: BacktestConfig,
        spec: InstrumentSpec,
        generator: Box<dyn SignalGenerator>,
    ) -> EngineResult<Self> {
        config.validate()?;
        spec.validate()?;
        Ok(Self {
            config,
            spec,
            generator,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    /// Replay `bars` and return the trade ledger.
    ///
    /// Every run starts from fresh gate and position state, so the engine
    /// can be reused. Bars must be in ascending time order.
    pub fn run(&self, bars: &[Bar]) -> EngineResult<BacktestResult> {
        let clock = self.config.risk.venue_clock()?;
        let starting_balance = self.config.risk.starting_balance;
        let result = BacktestResult::new(&self.spec.symbol, starting_balance, clock);

        let Some(first) = bars.first() else {
            return Ok(result);
        };
        if let Some(pair) = bars.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
            return Err(BacktestError::Config(format!(
                "bars out of order: {} after {}",
                pair[1].timestamp, pair[0].timestamp
            )));
        }

        let mut run = Replay {
            gate: RiskGate::new(&self.config.risk, self.spec.clone(), first.timestamp)?,
            manager: PositionManager::new(self.spec.clone(), self.config.exit.clone()),
            balance: starting_balance,
            result,
        };
        run.result.first_bar = Some(first.timestamp);
        run.result.equity_curve.push(EquityPoint {
            timestamp: first.timestamp,
            balance: starting_balance,
        });

        info!(
            instrument = %self.spec.symbol,
            generator = self.generator.name(),
            bars = bars.len(),
            "Backtest started"
        );

        for (i, bar) in bars.iter().enumerate() {
            let visible = &bars[..=i];

            // exits first
            let view = run
                .manager
                .position()
                .filter(|_| run.manager.is_open())
                .map(|position| position.view(i));
            if let Some(view) = view {
                let advice = self.generator.manage_exit(visible, &view);
                if let Some(trade) = run.manager.on_bar(bar, i, advice) {
                    run.record(&trade, i);
                }
                run.manager.drain_stop_updates();
            }

            if run.manager.is_flat() && i + 1 >= self.config.warmup_bars {
                self.try_entry(&mut run, visible, bar, i)?;
            }

            run.result.bars_processed += 1;
        }

        let last = &bars[bars.len() - 1];
        if run.manager.is_open() {
            let trade = run
                .manager
                .close(last.close, ExitReason::TimeExit, last.timestamp)?;
            run.record(&trade, bars.len() - 1);
        }
        run.result.last_bar = Some(last.timestamp);

        let result = run.result;
        info!(
            instrument = %self.spec.symbol,
            trades = result.trade_count(),
            total_pnl = %result.total_pnl(),
            max_drawdown = %result.max_drawdown(),
            rejections = result.rejections.values().sum::<u32>(),
            "Backtest finished"
        );
        Ok(result)
    }

    fn try_entry(
        &self,
        run: &mut Replay,
        visible: &[Bar],
        bar: &Bar,
        index: usize,
    ) -> EngineResult<()> {
        let regime = bar.indicators.regime;
        let Some(setup) = self
            .generator
            .check_entry(visible, regime, self.config.min_confidence)
        else {
            return Ok(());
        };
        run.result.signals_seen += 1;

        if setup.instrument != self.spec.symbol {
            run.reject(&format!(
                "setup instrument {} does not match {}",
                setup.instrument, self.spec.symbol
            ));
            return Ok(());
        }

        let decision = run.gate.evaluate(&setup, bar.timestamp, run.balance);
        if !decision.approved {
            debug!(
                instrument = %self.spec.symbol,
                bar = index,
                reason = decision.primary_reason(),
                blocked_by = ?decision.blocked_by,
                "Entry rejected"
            );
            run.reject(decision.primary_reason());
            return Ok(());
        }

        run.manager
            .open_filled(&setup, decision.contracts, setup.entry, bar.timestamp, index)?;
        debug!(
            instrument = %self.spec.symbol,
            bar = index,
            direction = %setup.direction,
            contracts = decision.contracts,
            entry = %setup.entry,
            reasons = ?decision.reasons,
            "Entry approved"
        );
        Ok(())
    }
}

/// Mutable state of a single run.
struct Replay {
    gate: RiskGate,
    manager: PositionManager,
    balance: Decimal,
    result: BacktestResult,
}

impl Replay {
    fn record(&mut self, trade: &ClosedTrade, exit_bar: usize) {
        self.gate.record_trade_result(trade.pnl, trade.exit_time);
        self.balance += trade.pnl;
        self.result.equity_curve.push(EquityPoint {
            timestamp: trade.exit_time,
            balance: self.balance,
        });
        self.result
            .trades
            .push(BacktestTrade::from_closed(trade, exit_bar));
    }

    fn reject(&mut self, reason: &str) {
        let key: String = reason.chars().take(REJECTION_KEY_LEN).collect();
        *self.result.rejections.entry(key).or_insert(0) += 1;
    }
}
