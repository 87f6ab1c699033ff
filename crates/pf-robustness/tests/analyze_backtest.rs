//! Robustness pass over a ledger produced by the replay engine.

use chrono::{Duration, TimeZone, Utc};
use pf_backtest::{BacktestConfig, BacktestEngine, ScriptedSignals};
use pf_core::{Bar, Direction, InstrumentSpec, Price, TradeSetup};
use pf_robustness::{analyze, RobustnessConfig, RobustnessError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn spec() -> InstrumentSpec {
    InstrumentSpec::new("MES", dec!(5), dec!(0.25), dec!(1500)).with_costs(dec!(1), dec!(1.24))
}

/// Alternating up and down swings over several venue days.
fn bars() -> Vec<Bar> {
    let mut out = Vec::new();
    for day in 0..5i64 {
        // 10:00 venue time each day
        let open = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap() + Duration::days(day);
        for i in 0..24i64 {
            let swing = Decimal::from((i % 6) * 3);
            let base = dec!(5000) + if day % 2 == 0 { swing } else { -swing };
            out.push(Bar::new(
                open + Duration::minutes(5 * i),
                Price::new(base),
                Price::new(base + dec!(11)),
                Price::new(base - dec!(11)),
                Price::new(base + dec!(1)),
                500,
            ));
        }
    }
    out
}

fn signals(bars: &[Bar]) -> ScriptedSignals {
    let mut s = ScriptedSignals::new();
    for i in (2..bars.len()).step_by(7) {
        let entry = bars[i].close;
        s = s.entry_at(
            i,
            TradeSetup::new("MES", Direction::Long, entry, entry - dec!(10), entry + dec!(10)),
        );
    }
    s
}

#[test]
fn full_pass_over_replay_ledger() {
    let bars = bars();
    let config = BacktestConfig {
        warmup_bars: 1,
        ..Default::default()
    };
    let engine = BacktestEngine::new(config, spec(), Box::new(signals(&bars))).unwrap();
    let result = engine.run(&bars).unwrap();
    assert!(result.trade_count() >= 3, "got {}", result.trade_count());

    let robustness = RobustnessConfig {
        fill_iterations: 200,
        ..Default::default()
    };
    let report = analyze(&result, &spec(), &robustness).unwrap();

    let actual = result.max_drawdown();
    assert_eq!(report.monte_carlo.trades, result.trade_count());
    assert!((report.monte_carlo.actual_drawdown - actual.to_f64().unwrap()).abs() < 1e-6);
    assert!(report.monte_carlo.distribution.max >= report.monte_carlo.distribution.min);

    assert_eq!(report.cost_sensitivity.len(), 5);
    assert_eq!(report.cost_sensitivity[0].gross_pnl, result.total_pnl());
    assert!(report
        .cost_sensitivity
        .windows(2)
        .all(|w| w[0].net_pnl > w[1].net_pnl));

    assert!(report.worst_day.trades > 0);
    assert!(report.worst_streaks.len() <= 5);
    assert!(report.fills.fill_rate > 0.0 && report.fills.fill_rate <= 1.0);

    // the whole report is serializable for offline review
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"worst_week\""));

    // deterministic under a fixed seed
    let again = analyze(&result, &spec(), &robustness).unwrap();
    assert_eq!(report, again);
}

#[test]
fn empty_ledger_reports_insufficient_trades() {
    let engine = BacktestEngine::new(
        BacktestConfig::default(),
        spec(),
        Box::new(ScriptedSignals::new()),
    )
    .unwrap();
    let result = engine.run(&bars()).unwrap();
    assert!(result.trades.is_empty());
    let err = analyze(&result, &spec(), &RobustnessConfig::default()).unwrap_err();
    assert!(matches!(err, RobustnessError::InsufficientTrades { .. }));
}
