//! Per-instrument worker.
//!
//! Every input for one instrument (bar polls, reconcile ticks, venue
//! callbacks, shutdown) arrives on a single queue and is handled to
//! completion before the next one, so the risk gate, position manager and
//! event log never see interleaved updates. Instruments never share a
//! worker.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use pf_core::{
    Bar, BracketOrder, ClientOrderId, InstrumentSpec, OrderRequest, OrderRole, Price,
    SignalGenerator, VenueClock,
};
use pf_persistence::{read_history, EventLogWriter, EventRecord, TradeEvent};
use pf_position::{
    recover_from_events, ClosedTrade, DynVenue, ExitReason, FlattenReason, Flattener,
    OrderStatus, PositionError, PositionManager, ReconcileOutcome, VenueError, VenueEvent,
    VenuePosition, VenueResult,
};
use pf_risk::RiskGate;
use pf_telemetry::Metrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, RuntimeConfig};
use crate::error::AppResult;
use crate::status::{InstrumentStatus, PositionSnapshot, StatusBoard};

/// Queue depth per worker. Ticks are dropped rather than queued when full.
pub const WORKER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMsg {
    PollBars,
    Reconcile,
    Venue(VenueEvent),
    Shutdown,
}

/// Apply the per-request timeout to a venue call.
async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = VenueResult<T>>,
) -> VenueResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(VenueError::Timeout(format!(
            "no response within {}s",
            limit.as_secs()
        ))),
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

pub struct InstrumentWorker {
    instrument: String,
    runtime: RuntimeConfig,
    clock: VenueClock,
    venue: DynVenue,
    generator: Box<dyn SignalGenerator>,
    gate: RiskGate,
    manager: PositionManager,
    log: EventLogWriter,
    flattener: Flattener,
    status: StatusBoard,

    balance: Decimal,
    realized_today: Decimal,
    realized_date: NaiveDate,
    /// Rolling window handed to the signal generator.
    bars: Vec<Bar>,
    /// Monotonic count of bars processed; the position's bar index.
    bars_seen: usize,
    last_bar_at: Option<DateTime<Utc>>,
    last_reconcile_at: Option<DateTime<Utc>>,
    backoff_until: Option<DateTime<Utc>>,
    venue_connected: bool,
}

impl InstrumentWorker {
    pub fn new(
        config: &AppConfig,
        spec: InstrumentSpec,
        venue: DynVenue,
        generator: Box<dyn SignalGenerator>,
        status: StatusBoard,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let clock = config.risk.venue_clock()?;
        let instrument = spec.symbol.clone();
        let gate = RiskGate::new(&config.risk, spec.clone(), now)?;
        let manager = PositionManager::new(spec, config.exit.clone());
        let log = EventLogWriter::new(
            &config.persistence.log_dir,
            &instrument,
            clock,
            config.persistence.buffer_size,
        );
        let flattener = Flattener::new(chrono::Duration::seconds(
            config.runtime.flatten_grace_secs as i64,
        ));

        Ok(Self {
            instrument,
            runtime: config.runtime.clone(),
            clock,
            venue,
            generator,
            gate,
            manager,
            log,
            flattener,
            status,
            balance: config.starting_balance(),
            realized_today: Decimal::ZERO,
            realized_date: clock.venue_date(now),
            bars: Vec::new(),
            bars_seen: 0,
            last_bar_at: None,
            last_reconcile_at: None,
            backoff_until: None,
            venue_connected: true,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn manager(&self) -> &PositionManager {
        &self.manager
    }

    pub fn gate(&self) -> &RiskGate {
        &self.gate
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn realized_today(&self) -> Decimal {
        self.realized_today
    }

    pub fn backoff_until(&self) -> Option<DateTime<Utc>> {
        self.backoff_until
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Event log file for a venue date.
    pub fn log_path(&self, date: NaiveDate) -> std::path::PathBuf {
        self.log.path_for(date)
    }

    /// Rebuild state from the event log history, then reconcile.
    ///
    /// Every realized trade on record, earlier days included, is replayed
    /// through the risk gate so the daily, consistency, inactivity and
    /// cooldown breakers resume where they stopped, and the balance picks
    /// up all realized P&L. A recovered position comes back flagged for
    /// reconcile, and the venue is asked for its position immediately.
    pub async fn startup(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        let today = self.clock.venue_date(now);
        let events = read_history(self.log.base_dir(), &self.instrument, today)?;
        let recovered = recover_from_events(&self.instrument, &events, today, &self.clock);

        if let Some(first) = recovered.first_event_at {
            self.gate.breakers_mut().inactivity.backdate(first);
        }
        for outcome in recovered
            .prior_outcomes
            .iter()
            .chain(&recovered.stats.outcomes)
        {
            self.gate.record_trade_result(outcome.pnl, outcome.at);
        }
        let prior_pnl: Decimal = recovered.prior_outcomes.iter().map(|o| o.pnl).sum();
        self.balance += prior_pnl + recovered.stats.realized_pnl;
        self.realized_today = recovered.stats.realized_pnl;
        self.realized_date = today;
        self.manager.restore(&recovered, self.bars_seen)?;

        info!(
            instrument = %self.instrument,
            events = recovered.events_applied,
            trades_today = recovered.stats.trades,
            prior_trades = recovered.prior_outcomes.len(),
            realized_pnl = %recovered.stats.realized_pnl,
            balance = %self.balance,
            position = recovered.position.is_some(),
            "Recovered state from event log"
        );
        self.append(
            now,
            TradeEvent::Status {
                message: format!(
                    "worker started: {} event(s) replayed, {} trade(s) today, position {}",
                    recovered.events_applied,
                    recovered.stats.trades,
                    self.manager.state().label()
                ),
            },
        );

        self.reconcile(now).await?;
        self.publish_status(now);
        Ok(())
    }

    /// Process messages until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<WorkerMsg>) -> AppResult<()> {
        info!(instrument = %self.instrument, "Worker running");
        while let Some(msg) = rx.recv().await {
            let now = Utc::now();
            if msg == WorkerMsg::Shutdown {
                return self.shutdown(&mut rx, now).await;
            }
            if let Err(e) = self.handle(msg, now).await {
                error!(instrument = %self.instrument, error = %e, "Worker step failed");
                self.append(now, TradeEvent::Error { message: e.to_string() });
            }
            self.publish_status(now);
        }

        warn!(instrument = %self.instrument, "Worker queue closed without shutdown");
        self.shutdown(&mut rx, Utc::now()).await
    }

    /// Handle one message. `Shutdown` is only acted on by `run`.
    pub async fn handle(&mut self, msg: WorkerMsg, now: DateTime<Utc>) -> AppResult<()> {
        match msg {
            WorkerMsg::PollBars => self.poll_bars(now).await,
            WorkerMsg::Reconcile => self.reconcile(now).await,
            WorkerMsg::Venue(event) => self.on_venue_event(event, now).await,
            WorkerMsg::Shutdown => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Decision cycle
    // ------------------------------------------------------------------

    /// Fetch new bars, manage the open position on each, then look for an
    /// entry on the latest one.
    pub async fn poll_bars(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.in_backoff(now) {
            return Ok(());
        }
        let started = Instant::now();

        let since = self.bars.last().map(|b| b.timestamp);
        let fetched = with_timeout(
            self.runtime.venue_timeout(),
            self.venue.fetch_bars(&self.instrument, since),
        )
        .await;
        let fetched = match fetched {
            Ok(bars) => bars,
            Err(e) => {
                self.on_venue_failure("fetch_bars", &e, now);
                return Ok(());
            }
        };

        let new_bars: Vec<Bar> = fetched
            .into_iter()
            .filter(|b| since.map_or(true, |s| b.timestamp > s))
            .collect();
        if new_bars.is_empty() {
            debug!(instrument = %self.instrument, "No new bars");
            return Ok(());
        }

        for bar in new_bars {
            self.push_bar(bar);
            self.manage_position(now).await?;
        }
        self.try_entry(now).await?;

        Metrics::decision_cycle(&self.instrument, started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    fn push_bar(&mut self, bar: Bar) {
        self.last_bar_at = Some(bar.timestamp);
        self.bars.push(bar);
        self.bars_seen += 1;
        if self.bars.len() > self.runtime.bar_history {
            let excess = self.bars.len() - self.runtime.bar_history;
            self.bars.drain(..excess);
        }
    }

    async fn manage_position(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        let Some(bar) = self.bars.last().cloned() else {
            return Ok(());
        };
        let index = self.bars_seen - 1;
        let Some(position) = self.manager.position().filter(|_| self.manager.is_open()) else {
            return Ok(());
        };
        let orders = position.orders.clone();
        let view = position.view(index);

        let advice = self.generator.manage_exit(&self.bars, &view);
        if let Some(trade) = self.manager.on_bar(&bar, index, advice) {
            match trade.exit_reason {
                ExitReason::Stop | ExitReason::Breakeven | ExitReason::Trail => {
                    if let Some(id) = orders.target {
                        self.cancel(id).await;
                    }
                }
                ExitReason::Target => {
                    if let Some(id) = orders.stop {
                        self.cancel(id).await;
                    }
                }
                _ => {
                    for id in orders.working_children() {
                        self.cancel(id).await;
                    }
                    let order = OrderRequest::market(
                        &self.instrument,
                        trade.direction.opposite(),
                        trade.contracts,
                        OrderRole::Flatten,
                    );
                    self.submit_exit_order(order, now).await;
                }
            }
            self.record_closed(trade);
            return Ok(());
        }

        for update in self.manager.drain_stop_updates() {
            self.append(
                now,
                TradeEvent::StopUpdate {
                    old_stop: update.old_stop,
                    new_stop: update.new_stop,
                    reason: update.reason.clone(),
                },
            );
            let Some(stop_id) = orders.stop.clone() else {
                continue;
            };
            let result = with_timeout(
                self.runtime.venue_timeout(),
                self.venue.modify_stop(stop_id, update.new_stop),
            )
            .await;
            if let Err(e) = result {
                self.on_venue_failure("modify_stop", &e, now);
            }
        }
        Ok(())
    }

    async fn submit_exit_order(&mut self, order: OrderRequest, now: DateTime<Utc>) {
        self.append(now, order_event(&order));
        let result = with_timeout(
            self.runtime.venue_timeout(),
            self.venue.submit_order(order),
        )
        .await;
        if let Err(e) = result {
            // The next reconcile surfaces any exposure left behind.
            self.on_venue_failure("submit_order", &e, now);
        }
    }

    async fn try_entry(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if !self.manager.is_flat() || self.bars.len() < self.runtime.warmup_bars.max(1) {
            return Ok(());
        }
        let Some(regime) = self.bars.last().map(|b| b.indicators.regime) else {
            return Ok(());
        };
        let Some(setup) =
            self.generator
                .check_entry(&self.bars, regime, self.runtime.min_confidence)
        else {
            return Ok(());
        };
        if setup.instrument != self.instrument {
            warn!(
                instrument = %self.instrument,
                setup_instrument = %setup.instrument,
                "Ignoring setup for another instrument"
            );
            return Ok(());
        }

        let decision = self.gate.evaluate(&setup, now, self.balance);
        Metrics::decision(&self.instrument, decision.approved);
        for breaker in &decision.blocked_by {
            Metrics::breaker_blocked(breaker, &self.instrument);
        }

        // The decision and its reasons are durable before any order leaves.
        self.append(
            now,
            TradeEvent::Signal {
                setup: setup.clone(),
                approved: decision.approved,
                contracts: decision.contracts,
                reasons: decision.reasons.clone(),
            },
        );

        if !decision.approved {
            info!(
                instrument = %self.instrument,
                direction = %setup.direction,
                reason = decision.primary_reason(),
                blocked_by = ?decision.blocked_by,
                "Trade rejected"
            );
            return Ok(());
        }

        info!(
            instrument = %self.instrument,
            direction = %setup.direction,
            contracts = decision.contracts,
            entry = %setup.entry,
            stop = %setup.stop,
            target = %setup.target,
            risk = %decision.total_risk,
            reasons = ?decision.reasons,
            warnings = ?decision.warnings,
            "Trade approved"
        );

        let bracket = BracketOrder::new(
            &self.instrument,
            setup.direction,
            decision.contracts,
            setup.entry,
            setup.stop,
            setup.target,
        );
        for order in [&bracket.entry, &bracket.stop, &bracket.target] {
            self.append(now, order_event(order));
        }
        self.manager
            .open_pending(&setup, decision.contracts, bracket.ids(), now, self.bars_seen - 1)?;

        let result = with_timeout(
            self.runtime.venue_timeout(),
            self.venue.submit_bracket(bracket),
        )
        .await;
        if let Err(e) = result {
            self.manager.abandon_entry(&format!("bracket submission failed: {e}"));
            self.on_venue_failure("submit_bracket", &e, now);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Ask the venue for its position and reconcile against it.
    pub async fn reconcile(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.in_backoff(now) {
            return Ok(());
        }
        let report = with_timeout(
            self.runtime.venue_timeout(),
            self.venue.position(&self.instrument),
        )
        .await;
        match report {
            Ok(report) => self.apply_report(&report, now).await,
            Err(e) => {
                self.on_venue_failure("position", &e, now);
                Ok(())
            }
        }
    }

    async fn apply_report(&mut self, report: &VenuePosition, now: DateTime<Utc>) -> AppResult<()> {
        let orders = self.manager.position().map(|p| p.orders.clone());
        let last_price = self.last_price();

        let outcome = match self.manager.reconcile(report, last_price, now) {
            Ok(outcome) => outcome,
            Err(e @ PositionError::Unreconciled { .. }) => {
                // Never adopt unknown exposure; an operator has to look.
                error!(instrument = %self.instrument, error = %e, "Reconcile failed");
                Metrics::reconcile_correction(&self.instrument, "unreconciled");
                self.append(now, TradeEvent::Error { message: e.to_string() });
                self.last_reconcile_at = Some(now);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.last_reconcile_at = Some(now);

        if outcome.is_correction() {
            Metrics::reconcile_correction(&self.instrument, outcome.kind());
        }

        match outcome {
            ReconcileOutcome::InSync => {}
            ReconcileOutcome::EntryConfirmed { fill_price } => {
                if let Some(position) = self.manager.position() {
                    let event = TradeEvent::Fill {
                        order_id: position
                            .orders
                            .entry
                            .clone()
                            .unwrap_or_else(|| ClientOrderId::from_string("reconcile".to_string())),
                        role: OrderRole::Entry,
                        price: fill_price,
                        contracts: position.contracts,
                    };
                    self.append(now, event);
                }
            }
            ReconcileOutcome::Corrected { reason } => {
                self.append(now, TradeEvent::Status { message: reason });
            }
            ReconcileOutcome::SyntheticClose { trade } => {
                for id in orders.map(|o| o.working_children()).unwrap_or_default() {
                    self.cancel(id).await;
                }
                self.record_closed(trade);
            }
            ReconcileOutcome::PhantomCleared { trade, cancel } => {
                for id in cancel {
                    self.cancel(id).await;
                }
                // Logged so recovery drops the position; never a real trade.
                self.append(now, trade.to_event());
            }
        }
        Ok(())
    }

    fn last_price(&self) -> Price {
        self.bars
            .last()
            .map(|b| b.close)
            .or_else(|| self.manager.position().map(|p| p.entry_price))
            .unwrap_or_else(|| Price::new(Decimal::ZERO))
    }

    // ------------------------------------------------------------------
    // Venue callbacks
    // ------------------------------------------------------------------

    async fn on_venue_event(&mut self, event: VenueEvent, now: DateTime<Utc>) -> AppResult<()> {
        match event {
            VenueEvent::Fill {
                order_id,
                price,
                contracts,
                at,
            } => self.on_fill(order_id, price, contracts, at).await,
            VenueEvent::OrderStatus { order_id, status } => {
                self.on_order_status(order_id, status, now);
                Ok(())
            }
            VenueEvent::Position(report) => self.apply_report(&report, now).await,
            VenueEvent::Disconnected => {
                self.venue_connected = false;
                Metrics::venue_connected(false);
                warn!(instrument = %self.instrument, "Venue disconnected");
                self.append(now, TradeEvent::Status { message: "venue disconnected".to_string() });
                Ok(())
            }
            VenueEvent::Reconnected => {
                self.venue_connected = true;
                Metrics::venue_connected(true);
                info!(instrument = %self.instrument, "Venue reconnected, reconciling");
                self.append(now, TradeEvent::Status { message: "venue reconnected".to_string() });
                self.reconcile(now).await
            }
        }
    }

    async fn on_fill(
        &mut self,
        order_id: ClientOrderId,
        price: Price,
        contracts: u32,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.flattener.is_flatten_order(&self.instrument, &order_id) {
            self.append(
                at,
                TradeEvent::Fill {
                    order_id,
                    role: OrderRole::Flatten,
                    price,
                    contracts,
                },
            );
            self.flattener.mark_completed(&self.instrument, at);
            if self.manager.is_open() {
                let trade = self.manager.close(price, ExitReason::Flatten, at)?;
                self.record_closed(trade);
            }
            return Ok(());
        }

        let Some(position) = self.manager.position() else {
            debug!(instrument = %self.instrument, %order_id, "Fill for no local position");
            return Ok(());
        };
        let orders = position.orders.clone();
        let stop_reason = position.stop_exit_reason();

        if orders.entry.as_ref() == Some(&order_id) {
            if self.manager.is_pending() {
                self.manager.confirm_entry(price, at)?;
                self.append(
                    at,
                    TradeEvent::Fill {
                        order_id,
                        role: OrderRole::Entry,
                        price,
                        contracts,
                    },
                );
            }
            return Ok(());
        }

        if !self.manager.is_open() {
            return Ok(());
        }
        let (role, reason, sibling) = if orders.stop.as_ref() == Some(&order_id) {
            (OrderRole::Stop, stop_reason, orders.target.clone())
        } else if orders.target.as_ref() == Some(&order_id) {
            (OrderRole::Target, ExitReason::Target, orders.stop.clone())
        } else {
            debug!(instrument = %self.instrument, %order_id, "Fill for unknown order");
            return Ok(());
        };

        self.append(
            at,
            TradeEvent::Fill {
                order_id,
                role,
                price,
                contracts,
            },
        );
        let trade = self.manager.close(price, reason, at)?;
        if let Some(id) = sibling {
            self.cancel(id).await;
        }
        self.record_closed(trade);
        Ok(())
    }

    fn on_order_status(&mut self, order_id: ClientOrderId, status: OrderStatus, now: DateTime<Utc>) {
        let is_pending_entry = self.manager.is_pending()
            && self
                .manager
                .position()
                .is_some_and(|p| p.orders.entry.as_ref() == Some(&order_id));

        match status {
            OrderStatus::Rejected(reason) if is_pending_entry => {
                warn!(instrument = %self.instrument, %order_id, reason = %reason, "Entry rejected by venue");
                self.manager.abandon_entry(&format!("entry rejected: {reason}"));
                self.append(now, TradeEvent::Error { message: format!("entry {order_id} rejected: {reason}") });
            }
            OrderStatus::Cancelled if is_pending_entry => {
                warn!(instrument = %self.instrument, %order_id, "Entry cancelled by venue");
                self.manager.abandon_entry("entry cancelled");
                self.append(now, TradeEvent::Status { message: format!("entry {order_id} cancelled") });
            }
            OrderStatus::Rejected(reason) => {
                error!(instrument = %self.instrument, %order_id, reason = %reason, "Order rejected by venue");
                self.append(now, TradeEvent::Error { message: format!("order {order_id} rejected: {reason}") });
            }
            other => {
                debug!(instrument = %self.instrument, %order_id, status = ?other, "Order status");
            }
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Cancel a pending entry, flatten an open position, close the log.
    async fn shutdown(
        &mut self,
        rx: &mut mpsc::Receiver<WorkerMsg>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        info!(instrument = %self.instrument, state = self.manager.state().label(), "Worker shutting down");

        if self.manager.is_pending() {
            let ids = self
                .manager
                .position()
                .map(|p| p.orders.all())
                .unwrap_or_default();
            for id in ids {
                self.cancel(id).await;
            }
            self.manager.abandon_entry("shutdown");
            self.append(now, TradeEvent::Status { message: "pending entry cancelled on shutdown".to_string() });
        }

        let request = self
            .manager
            .position()
            .filter(|_| self.manager.is_open())
            .cloned()
            .and_then(|position| {
                self.flattener
                    .start_flatten(&position, FlattenReason::Shutdown, now)
            });
        if let Some(request) = request {
            for id in &request.cancel {
                self.cancel(id.clone()).await;
            }
            let order = request.to_order();
            let order_id = order.client_id.clone();
            self.append(now, order_event(&order));
            let result = with_timeout(
                self.runtime.venue_timeout(),
                self.venue.submit_order(order),
            )
            .await;
            match result {
                Ok(()) => {
                    self.flattener.mark_in_progress(&self.instrument, order_id, now);
                    self.await_flatten(rx).await;
                }
                Err(e) => {
                    self.flattener
                        .mark_failed(&self.instrument, format!("flatten order refused: {e}"), now);
                    self.append(now, TradeEvent::Error { message: format!("flatten order refused: {e}") });
                }
            }
        }

        self.append(Utc::now(), TradeEvent::Status { message: "worker stopped".to_string() });
        self.publish_status(Utc::now());
        self.log.close()?;
        Ok(())
    }

    /// Wait up to the grace period for the flatten fill. Ticks are ignored.
    async fn await_flatten(&mut self, rx: &mut mpsc::Receiver<WorkerMsg>) {
        let grace = self.runtime.flatten_grace();
        let waited = tokio::time::timeout(grace, async {
            while let Some(msg) = rx.recv().await {
                if let WorkerMsg::Venue(event) = msg {
                    if let Err(e) = self.on_venue_event(event, Utc::now()).await {
                        error!(instrument = %self.instrument, error = %e, "Venue event failed during flatten");
                    }
                    if self.manager.is_flat() {
                        return true;
                    }
                }
            }
            false
        })
        .await;

        let now = Utc::now();
        match waited {
            Ok(true) => info!(instrument = %self.instrument, "Position flattened on shutdown"),
            Ok(false) => {
                self.flattener.mark_failed(
                    &self.instrument,
                    "queue closed before the flatten fill".to_string(),
                    now,
                );
                self.append(now, TradeEvent::Error { message: "flatten unconfirmed: queue closed".to_string() });
            }
            Err(_) => {
                self.flattener.mark_failed(
                    &self.instrument,
                    format!("no fill within {}s", grace.as_secs()),
                    now,
                );
                self.append(
                    now,
                    TradeEvent::Error {
                        message: format!(
                            "flatten unconfirmed after {}s; check the venue position",
                            grace.as_secs()
                        ),
                    },
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn record_closed(&mut self, trade: ClosedTrade) {
        let date = self.clock.venue_date(trade.exit_time);
        if date != self.realized_date {
            self.realized_date = date;
            self.realized_today = Decimal::ZERO;
        }
        self.gate.record_trade_result(trade.pnl, trade.exit_time);
        self.balance += trade.pnl;
        self.realized_today += trade.pnl;

        info!(
            instrument = %self.instrument,
            pnl = %trade.pnl,
            balance = %self.balance,
            realized_today = %self.realized_today,
            "Trade recorded"
        );
        self.append(trade.exit_time, trade.to_event());
        Metrics::trade_closed(&self.instrument, trade.exit_reason.as_str(), to_f64(trade.pnl));
        Metrics::realized_pnl_today(&self.instrument, to_f64(self.realized_today));
    }

    async fn cancel(&mut self, order_id: ClientOrderId) {
        let result = with_timeout(
            self.runtime.venue_timeout(),
            self.venue.cancel_order(order_id.clone()),
        )
        .await;
        if let Err(e) = result {
            warn!(instrument = %self.instrument, %order_id, error = %e, "Cancel failed");
            Metrics::venue_retry("cancel_order", e.kind());
        }
    }

    fn on_venue_failure(&mut self, operation: &str, e: &VenueError, now: DateTime<Utc>) {
        Metrics::venue_retry(operation, e.kind());
        if e.is_retryable() {
            let until = now + self.runtime.backoff();
            self.backoff_until = Some(until);
            warn!(
                instrument = %self.instrument,
                operation,
                error = %e,
                until = %until,
                "Venue unavailable, backing off"
            );
            self.append(
                now,
                TradeEvent::Status {
                    message: format!("{operation} failed ({e}); retrying after {until}"),
                },
            );
        } else {
            error!(instrument = %self.instrument, operation, error = %e, "Venue request failed");
            self.append(
                now,
                TradeEvent::Error {
                    message: format!("{operation} failed: {e}"),
                },
            );
        }
    }

    fn in_backoff(&mut self, now: DateTime<Utc>) -> bool {
        match self.backoff_until {
            Some(until) if now < until => {
                debug!(instrument = %self.instrument, until = %until, "In back-off, skipping");
                true
            }
            Some(_) => {
                info!(instrument = %self.instrument, "Back-off elapsed");
                self.backoff_until = None;
                false
            }
            None => false,
        }
    }

    /// Write a record and flush it. Log failures never stop trading.
    fn append(&mut self, at: DateTime<Utc>, event: TradeEvent) {
        let kind = event.kind();
        if let Err(e) = self
            .log
            .append_now(EventRecord::new(at, &self.instrument, event))
        {
            error!(instrument = %self.instrument, kind, error = %e, "Event log write failed");
            Metrics::event_log_error(&self.instrument);
        }
    }

    /// Push this worker's snapshot to the status board and gauges.
    pub fn publish_status(&self, now: DateTime<Utc>) {
        let gate = self.gate.status(now);
        let signed_contracts = self.manager.position().map_or(0.0, |p| {
            to_f64(Decimal::from(p.contracts) * p.direction.sign())
        });
        Metrics::buffer_remaining(&self.instrument, to_f64(gate.remaining_daily_buffer));
        Metrics::position_contracts(&self.instrument, signed_contracts);

        let status = InstrumentStatus {
            instrument: self.instrument.clone(),
            state: self.manager.state().label().to_string(),
            position: self.manager.position().map(PositionSnapshot::from),
            gate,
            balance: self.balance,
            realized_pnl_today: self.realized_today,
            last_bar_at: self.last_bar_at,
            last_reconcile_at: self.last_reconcile_at,
            venue_connected: self.venue_connected,
            backoff_until: self.backoff_until,
            updated_at: now,
        };
        self.status.insert(self.instrument.clone(), status);
    }
}

fn order_event(order: &OrderRequest) -> TradeEvent {
    TradeEvent::OrderSubmitted {
        order_id: order.client_id.clone(),
        role: order.role,
        direction: order.direction,
        contracts: order.contracts,
        price: order.price,
    }
}

/// Send a message on a fixed period. Ticks are dropped while the worker is
/// still busy with earlier ones.
pub fn spawn_ticker(
    tx: mpsc::Sender<WorkerMsg>,
    period: Duration,
    msg: WorkerMsg,
    skip_first: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        if skip_first {
            interval.tick().await;
        }
        loop {
            interval.tick().await;
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(?msg, "Worker busy, tick dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
    })
}

/// Forward venue callbacks into the worker queue.
pub fn spawn_forwarder(
    mut events: mpsc::UnboundedReceiver<VenueEvent>,
    tx: mpsc::Sender<WorkerMsg>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if tx.send(WorkerMsg::Venue(event)).await.is_err() {
                break;
            }
        }
    })
}
