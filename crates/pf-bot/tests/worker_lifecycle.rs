//! Worker lifecycle against the mock venue: entry, fills, back-off,
//! restart recovery and shutdown flattening.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pf_backtest::ScriptedSignals;
use pf_bot::{
    new_status_board, AppConfig, Application, InstrumentWorker, PersistenceConfig, RuntimeConfig,
    StatusBoard, WorkerMsg,
};
use pf_core::{
    Bar, Direction, InstrumentBook, OrderRole, OrderType, Price, SignalGenerator, TradeSetup,
};
use pf_persistence::{read_events, EventRecord, TradeEvent};
use pf_position::{ExitConfig, MockVenue, VenueError, VenueEvent, VenuePosition};
use pf_risk::{MarketHoursConfig, RiskConfig};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

const BARS: usize = 25;

/// 2025-03-04 10:30 venue time (EST).
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 15, 30, 0).unwrap()
}

fn quiet_bars() -> Vec<Bar> {
    let start = now() - Duration::minutes(5 * BARS as i64);
    (0..BARS)
        .map(|i| {
            Bar::new(
                start + Duration::minutes(5 * i as i64),
                Price::new(dec!(5000)),
                Price::new(dec!(5003)),
                Price::new(dec!(4997)),
                Price::new(dec!(5000)),
                800,
            )
        })
        .collect()
}

fn starting_balance() -> rust_decimal::Decimal {
    RiskConfig::default().starting_balance
}

fn long_setup() -> TradeSetup {
    TradeSetup::new(
        "MES",
        Direction::Long,
        Price::new(dec!(5000)),
        Price::new(dec!(4990)),
        Price::new(dec!(5020)),
    )
}

fn entry_on_last_bar() -> ScriptedSignals {
    ScriptedSignals::new().entry_at(BARS - 1, long_setup())
}

fn config(dir: &Path) -> AppConfig {
    AppConfig {
        instruments: vec!["MES".to_string()],
        specs: Vec::new(),
        risk: RiskConfig {
            // tests run on the wall clock in the app-level case
            market_hours: MarketHoursConfig {
                windows: Vec::new(),
                include_settlement_break: false,
            },
            ..Default::default()
        },
        exit: ExitConfig::default(),
        runtime: RuntimeConfig {
            warmup_bars: 5,
            ..Default::default()
        },
        persistence: PersistenceConfig {
            log_dir: dir.to_path_buf(),
            buffer_size: 8,
        },
        logging: Default::default(),
    }
}

struct Harness {
    venue: Arc<MockVenue>,
    worker: InstrumentWorker,
    events: mpsc::UnboundedReceiver<VenueEvent>,
    status: StatusBoard,
}

async fn harness(dir: &Path, venue: Arc<MockVenue>, signals: ScriptedSignals) -> Harness {
    harness_at(dir, venue, signals, now()).await
}

async fn harness_at(
    dir: &Path,
    venue: Arc<MockVenue>,
    signals: ScriptedSignals,
    started_at: DateTime<Utc>,
) -> Harness {
    use pf_position::ExecutionVenue;

    let config = config(dir);
    let spec = InstrumentBook::reference().get("MES").unwrap().clone();
    let status = new_status_board();
    let worker = InstrumentWorker::new(
        &config,
        spec,
        venue.clone(),
        Box::new(signals),
        status.clone(),
        started_at,
    )
    .unwrap();
    let (tx, events) = mpsc::unbounded_channel();
    venue.subscribe("MES", tx).await.unwrap();
    Harness {
        venue,
        worker,
        events,
        status,
    }
}

fn quiet_venue() -> Arc<MockVenue> {
    let venue = MockVenue::new().with_auto_fill();
    venue.set_bars("MES", quiet_bars());
    Arc::new(venue)
}

impl Harness {
    /// Feed queued venue callbacks to the worker.
    async fn pump(&mut self, at: DateTime<Utc>) {
        while let Ok(event) = self.events.try_recv() {
            self.worker.handle(WorkerMsg::Venue(event), at).await.unwrap();
        }
    }

    fn log(&self) -> Vec<EventRecord> {
        let date = now().date_naive();
        read_events(&self.worker.log_path(date)).unwrap()
    }

    /// Start, poll once and confirm the entry fill.
    async fn open_long(&mut self) {
        assert_ok!(self.worker.startup(now()).await);
        assert_ok!(self.worker.handle(WorkerMsg::PollBars, now()).await);
        self.pump(now()).await;
        assert!(self.worker.manager().is_open());
    }
}

fn kinds(records: &[EventRecord]) -> Vec<&'static str> {
    records.iter().map(|r| r.event.kind()).collect()
}

#[tokio::test]
async fn approved_entry_is_logged_before_submission_and_confirmed_by_fill() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(dir.path(), quiet_venue(), entry_on_last_bar()).await;

    h.worker.startup(now()).await.unwrap();
    h.worker.handle(WorkerMsg::PollBars, now()).await.unwrap();

    assert_eq!(h.worker.bars().len(), BARS);
    assert!(h.worker.manager().is_pending());
    let brackets = h.venue.brackets();
    assert_eq!(brackets.len(), 1);
    assert_eq!(brackets[0].entry.price, Some(Price::new(dec!(5000))));

    h.pump(now()).await;
    let position = h.worker.manager().position().unwrap();
    assert!(position.entry_confirmed);
    assert_eq!(position.entry_price, Price::new(dec!(5000)));

    let log = h.log();
    let k = kinds(&log);
    let signal = k.iter().position(|k| *k == "signal").unwrap();
    let submitted = k.iter().position(|k| *k == "order_submitted").unwrap();
    let fill = k.iter().position(|k| *k == "fill").unwrap();
    assert!(signal < submitted && submitted < fill, "order was {k:?}");
    assert_eq!(k.iter().filter(|k| **k == "order_submitted").count(), 3);

    match &log[signal].event {
        TradeEvent::Signal {
            approved, reasons, ..
        } => {
            assert!(approved);
            assert!(!reasons.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }

    h.worker.publish_status(now());
    let status = h.status.get("MES").unwrap().clone();
    assert_eq!(status.state, "open");
    assert!(status.position.is_some());
}

#[tokio::test]
async fn stop_fill_closes_position_and_cancels_target() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(dir.path(), quiet_venue(), entry_on_last_bar()).await;
    h.open_long().await;

    let contracts = h.worker.manager().position().unwrap().contracts;
    let ids = h.venue.brackets()[0].ids();
    let stop_id = ids.stop.clone().unwrap();
    let target_id = ids.target.clone().unwrap();

    let at = now() + Duration::minutes(20);
    assert!(h.venue.emit(
        "MES",
        VenueEvent::Fill {
            order_id: stop_id,
            price: Price::new(dec!(4990)),
            contracts,
            at,
        },
    ));
    h.pump(at).await;

    assert!(h.worker.manager().is_flat());
    let loss = dec!(-50) * rust_decimal::Decimal::from(contracts);
    assert_eq!(h.worker.realized_today(), loss);
    assert_eq!(h.worker.balance(), starting_balance() + loss);
    assert!(h.venue.cancels().contains(&target_id));

    let exit = h
        .log()
        .into_iter()
        .find_map(|r| match r.event {
            TradeEvent::Exit { reason, pnl, .. } => Some((reason, pnl)),
            _ => None,
        })
        .unwrap();
    assert_eq!(exit, ("stop".to_string(), loss));
}

#[tokio::test]
async fn retryable_bar_failure_backs_off_then_resumes() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();
    venue.set_bars_error(Some(VenueError::Pacing("too many requests".to_string())));
    let mut h = harness(dir.path(), venue, ScriptedSignals::new()).await;
    h.worker.startup(now()).await.unwrap();

    h.worker.handle(WorkerMsg::PollBars, now()).await.unwrap();
    assert_eq!(h.worker.backoff_until(), Some(now() + Duration::seconds(300)));
    assert!(h.worker.bars().is_empty());

    h.venue.set_bars_error(None);
    h.worker
        .handle(WorkerMsg::PollBars, now() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(h.worker.bars().is_empty(), "polled during back-off");

    h.worker
        .handle(WorkerMsg::PollBars, now() + Duration::minutes(6))
        .await
        .unwrap();
    assert_eq!(h.worker.bars().len(), BARS);
    assert_eq!(h.worker.backoff_until(), None);

    let noted = h.log().iter().any(|r| {
        matches!(&r.event, TradeEvent::Status { message } if message.contains("fetch_bars failed"))
    });
    assert!(noted);
}

#[tokio::test]
async fn non_retryable_failure_is_logged_without_backoff() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();
    venue.set_bars_error(Some(VenueError::Other("bad contract".to_string())));
    let mut h = harness(dir.path(), venue, ScriptedSignals::new()).await;
    h.worker.startup(now()).await.unwrap();

    h.worker.handle(WorkerMsg::PollBars, now()).await.unwrap();
    assert_eq!(h.worker.backoff_until(), None);
    assert!(h.log().iter().any(|r| r.event.kind() == "error"));
}

#[tokio::test]
async fn restart_closes_position_the_venue_no_longer_holds() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();
    let mut first = harness(dir.path(), venue.clone(), entry_on_last_bar()).await;
    first.open_long().await;
    let ids = first.venue.brackets()[0].ids();
    drop(first);

    // stopped out while the process was down
    venue.set_position(VenuePosition::flat("MES"));
    let mut second = harness(dir.path(), venue.clone(), ScriptedSignals::new()).await;
    second
        .worker
        .startup(now() + Duration::minutes(10))
        .await
        .unwrap();

    assert!(second.worker.manager().is_flat());
    let cancels = venue.cancels();
    assert!(cancels.contains(ids.stop.as_ref().unwrap()));
    assert!(cancels.contains(ids.target.as_ref().unwrap()));

    let reasons: Vec<String> = second
        .log()
        .into_iter()
        .filter_map(|r| match r.event {
            TradeEvent::Exit { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec!["reconcile".to_string()]);
}

#[tokio::test]
async fn restart_replays_todays_losses_into_the_gate() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();
    let mut first = harness(dir.path(), venue.clone(), entry_on_last_bar()).await;
    first.open_long().await;
    let contracts = first.worker.manager().position().unwrap().contracts;
    let ids = first.venue.brackets()[0].ids();
    let at = now() + Duration::minutes(15);
    first.venue.emit(
        "MES",
        VenueEvent::Fill {
            order_id: ids.stop.clone().unwrap(),
            price: Price::new(dec!(4990)),
            contracts,
            at,
        },
    );
    first.pump(at).await;
    let realized = first.worker.realized_today();
    assert!(realized < rust_decimal::Decimal::ZERO);
    drop(first);

    venue.set_position(VenuePosition::flat("MES"));
    let mut second = harness(dir.path(), venue, ScriptedSignals::new()).await;
    second
        .worker
        .startup(now() + Duration::minutes(30))
        .await
        .unwrap();

    assert!(second.worker.manager().is_flat());
    assert_eq!(second.worker.realized_today(), realized);
    assert_eq!(second.worker.balance(), starting_balance() + realized);
    let status = second.worker.gate().status(now() + Duration::minutes(30));
    assert_eq!(status.budget.current_balance, starting_balance() + realized);
}

#[tokio::test]
async fn restart_next_day_carries_multi_day_breakers_and_rolls_daily_loss() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();
    let mut first = harness(dir.path(), venue.clone(), entry_on_last_bar()).await;
    first.open_long().await;
    let contracts = first.worker.manager().position().unwrap().contracts;
    let ids = first.venue.brackets()[0].ids();
    let stopped_at = now() + Duration::minutes(15);
    first.venue.emit(
        "MES",
        VenueEvent::Fill {
            order_id: ids.stop.clone().unwrap(),
            price: Price::new(dec!(4990)),
            contracts,
            at: stopped_at,
        },
    );
    first.pump(stopped_at).await;
    let realized = first.worker.realized_today();
    assert!(realized < rust_decimal::Decimal::ZERO);
    let breakers = first.worker.gate().breakers();
    let total_before = breakers.consistency.total_profit();
    let last_activity_before = breakers.inactivity.last_activity();
    let losses_before = breakers.cooldown.consecutive_losses();
    drop(first);

    let next_day = now() + Duration::days(1);
    venue.set_position(VenuePosition::flat("MES"));
    let mut second = harness_at(dir.path(), venue, ScriptedSignals::new(), next_day).await;
    assert_ok!(second.worker.startup(next_day).await);

    // yesterday's loss is not today's
    assert_eq!(second.worker.realized_today(), rust_decimal::Decimal::ZERO);
    let breakers = second.worker.gate().breakers();
    assert_eq!(breakers.daily_loss.today_loss(next_day), rust_decimal::Decimal::ZERO);
    assert_eq!(breakers.daily_loss.trades_today(next_day), 0);

    // but the account history carries over
    assert_eq!(breakers.consistency.total_profit(), total_before);
    assert_eq!(breakers.consistency.total_profit(), realized);
    assert_eq!(breakers.inactivity.last_activity(), last_activity_before);
    assert_eq!(breakers.inactivity.last_activity(), stopped_at);
    assert_eq!(breakers.inactivity.idle_days(next_day), 1);
    assert_eq!(breakers.cooldown.consecutive_losses(), losses_before);
    assert_eq!(second.worker.balance(), starting_balance() + realized);
    let status = second.worker.gate().status(next_day);
    assert_eq!(status.budget.current_balance, starting_balance() + realized);
}

#[tokio::test]
async fn restart_without_trades_keeps_idle_clock_from_first_start() {
    let dir = TempDir::new().unwrap();
    let mut first = harness(dir.path(), quiet_venue(), ScriptedSignals::new()).await;
    assert_ok!(first.worker.startup(now()).await);
    drop(first);

    let later = now() + Duration::days(3);
    let mut second = harness_at(dir.path(), quiet_venue(), ScriptedSignals::new(), later).await;
    assert_ok!(second.worker.startup(later).await);

    let inactivity = &second.worker.gate().breakers().inactivity;
    assert_eq!(inactivity.last_activity(), now());
    assert_eq!(inactivity.idle_days(later), 3);
}

#[tokio::test]
async fn unknown_venue_exposure_is_surfaced_not_adopted() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();
    venue.set_position(VenuePosition::new(
        "MES",
        Direction::Long,
        2,
        Price::new(dec!(5000)),
    ));
    let mut h = harness(dir.path(), venue, ScriptedSignals::new()).await;

    assert_ok!(h.worker.startup(now()).await);
    assert!(h.worker.manager().is_flat());
    assert!(h.log().iter().any(|r| matches!(
        &r.event,
        TradeEvent::Error { message } if message.contains("Unreconciled")
    )));
}

#[tokio::test]
async fn venue_rejection_abandons_pending_entry() {
    let dir = TempDir::new().unwrap();
    let venue = Arc::new(MockVenue::new());
    venue.set_bars("MES", quiet_bars());
    let mut h = harness(dir.path(), venue, entry_on_last_bar()).await;
    h.worker.startup(now()).await.unwrap();
    h.worker.handle(WorkerMsg::PollBars, now()).await.unwrap();
    assert!(h.worker.manager().is_pending());

    let entry_id = h.venue.brackets()[0].entry.client_id.clone();
    h.venue.emit(
        "MES",
        VenueEvent::OrderStatus {
            order_id: entry_id,
            status: pf_position::OrderStatus::Rejected("insufficient margin".to_string()),
        },
    );
    h.pump(now()).await;
    assert!(h.worker.manager().is_flat());
}

#[tokio::test]
async fn shutdown_flattens_open_position() {
    let dir = TempDir::new().unwrap();
    let venue = quiet_venue();

    let mut generators: HashMap<String, Box<dyn SignalGenerator>> = HashMap::new();
    generators.insert("MES".to_string(), Box::new(entry_on_last_bar()));
    let app = Application::new(config(dir.path()), venue.clone(), generators).unwrap();
    let board = app.status_board();
    let running = app.start().await.unwrap();
    assert!(venue.is_connected());

    let mut opened = false;
    for _ in 0..100 {
        if board.get("MES").is_some_and(|s| s.state == "open") {
            opened = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(opened, "position never opened");

    running.shutdown().await.unwrap();
    assert!(!venue.is_connected());

    let flatten = venue
        .orders()
        .into_iter()
        .find(|o| o.role == OrderRole::Flatten)
        .unwrap();
    assert_eq!(flatten.direction, Direction::Short);
    assert_eq!(flatten.order_type, OrderType::Market);

    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        records.extend(read_events(&entry.unwrap().path()).unwrap());
    }
    let exit_reasons: Vec<String> = records
        .into_iter()
        .filter_map(|r| match r.event {
            TradeEvent::Exit { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(exit_reasons, vec!["flatten".to_string()]);
    assert_eq!(board.get("MES").unwrap().state, "flat");
}

#[tokio::test]
async fn missing_generator_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let result = Application::new(config(dir.path()), quiet_venue(), HashMap::new());
    assert!(matches!(result, Err(pf_bot::AppError::Config(_))));
}
