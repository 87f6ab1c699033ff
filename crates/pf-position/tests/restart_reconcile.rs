//! Restart scenarios: log written by a live session, process dies, a new
//! manager folds the log and reconciles against the venue.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pf_core::{BracketOrder, Direction, InstrumentSpec, OrderRole, Price, TradeSetup, VenueClock};
use pf_persistence::{read_events, EventLogWriter, EventRecord, TradeEvent};
use pf_position::{
    recover_from_events, ExitConfig, ExitReason, PositionManager, ReconcileOutcome, VenuePosition,
};
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    // 2025-03-04 venue time (EST)
    Utc.with_ymd_and_hms(2025, 3, 4, hour, min, 0).unwrap() + Duration::hours(5)
}

fn spec() -> InstrumentSpec {
    InstrumentSpec::new("MES", dec!(5), dec!(0.25), dec!(1500))
}

fn write_open_position(dir: &TempDir, filled: bool) -> BracketOrder {
    let setup = TradeSetup::new(
        "MES",
        Direction::Long,
        Price::new(dec!(5000)),
        Price::new(dec!(4990)),
        Price::new(dec!(5020)),
    );
    let bracket = BracketOrder::new("MES", Direction::Long, 1, setup.entry, setup.stop, setup.target);

    let mut writer = EventLogWriter::new(dir.path(), "MES", VenueClock::default(), 100);
    writer
        .append(EventRecord::new(
            at(10, 0),
            "MES",
            TradeEvent::Signal {
                setup,
                approved: true,
                contracts: 1,
                reasons: vec!["sized 1 contract(s)".to_string()],
            },
        ))
        .unwrap();
    for order in [&bracket.entry, &bracket.stop, &bracket.target] {
        writer
            .append(EventRecord::new(
                at(10, 0),
                "MES",
                TradeEvent::OrderSubmitted {
                    order_id: order.client_id.clone(),
                    role: order.role,
                    direction: order.direction,
                    contracts: order.contracts,
                    price: order.price,
                },
            ))
            .unwrap();
    }
    if filled {
        writer
            .append(EventRecord::new(
                at(10, 1),
                "MES",
                TradeEvent::Fill {
                    order_id: bracket.entry.client_id.clone(),
                    role: OrderRole::Entry,
                    price: Price::new(dec!(5000)),
                    contracts: 1,
                },
            ))
            .unwrap();
    }
    // dropped without close: Drop flushes
    bracket
}

fn restart(dir: &TempDir) -> PositionManager {
    let today = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
    let clock = VenueClock::default();
    let writer = EventLogWriter::new(dir.path(), "MES", clock, 100);
    let events = read_events(&writer.path_for(today)).unwrap();
    let recovered = recover_from_events("MES", &events, today, &clock);

    let mut mgr = PositionManager::new(spec(), ExitConfig::default());
    mgr.restore(&recovered, 0).unwrap();
    mgr
}

#[test]
fn confirmed_position_closed_by_broker_while_down() {
    let dir = TempDir::new().unwrap();
    write_open_position(&dir, true);

    let mut mgr = restart(&dir);
    assert!(mgr.is_open());
    assert!(mgr.needs_reconcile());

    // stop filled at the broker while the process was down
    let outcome = mgr
        .reconcile(&VenuePosition::flat("MES"), Price::new(dec!(4990)), at(10, 30))
        .unwrap();
    match outcome {
        ReconcileOutcome::SyntheticClose { trade } => {
            assert_eq!(trade.exit_reason, ExitReason::Reconcile);
            assert_eq!(trade.pnl, dec!(-50));
        }
        other => panic!("expected synthetic close, got {other:?}"),
    }
    assert!(mgr.is_flat());
    assert!(!mgr.needs_reconcile());
}

#[test]
fn unfilled_entry_cancelled_after_restart() {
    let dir = TempDir::new().unwrap();
    let bracket = write_open_position(&dir, false);

    let mut mgr = restart(&dir);
    assert!(mgr.is_pending());

    let outcome = mgr
        .reconcile(&VenuePosition::flat("MES"), Price::new(dec!(4980)), at(10, 30))
        .unwrap();
    match outcome {
        ReconcileOutcome::PhantomCleared { trade, cancel } => {
            assert_eq!(trade.exit_reason, ExitReason::ReconcileNoFill);
            assert!(trade.pnl.is_zero());
            assert_eq!(cancel, bracket.ids().all());
        }
        other => panic!("expected phantom clear, got {other:?}"),
    }
    assert!(mgr.is_flat());
}

#[test]
fn position_still_open_at_venue() {
    let dir = TempDir::new().unwrap();
    write_open_position(&dir, true);

    let mut mgr = restart(&dir);
    let report = VenuePosition::new("MES", Direction::Long, 1, Price::new(dec!(5000)));
    let outcome = mgr.reconcile(&report, Price::new(dec!(5003)), at(10, 30)).unwrap();
    assert_eq!(outcome, ReconcileOutcome::InSync);
    assert!(mgr.is_open());
}
