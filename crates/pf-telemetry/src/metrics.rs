//! Prometheus metrics for the live runtime.
//!
//! - Risk gate decisions and breaker blocks
//! - Closed trades and realized P&L
//! - Reconciliation corrections
//! - Venue connectivity and retries
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a fatal configuration error that should
//! crash at startup. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::TelemetryResult;

/// Risk gate decisions.
/// Labels: outcome (approved/rejected)
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pf_decisions_total",
        "Total risk gate decisions",
        &["instrument", "outcome"]
    )
    .unwrap()
});

/// Decisions blocked per circuit breaker.
pub static BREAKER_BLOCKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pf_breaker_blocks_total",
        "Total decisions blocked by a circuit breaker",
        &["breaker", "instrument"]
    )
    .unwrap()
});

/// Closed trades by exit reason.
pub static TRADES_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pf_trades_closed_total",
        "Total closed trades",
        &["instrument", "exit_reason"]
    )
    .unwrap()
});

/// Per-trade realized P&L in account currency.
pub static TRADE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pf_trade_pnl",
        "Realized P&L per trade (currency)",
        &["instrument", "exit_reason"],
        vec![-500.0, -250.0, -100.0, -50.0, 0.0, 50.0, 100.0, 250.0, 500.0]
    )
    .unwrap()
});

/// Realized P&L for the current venue day.
pub static REALIZED_PNL_TODAY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pf_realized_pnl_today",
        "Realized P&L for the current venue day",
        &["instrument"]
    )
    .unwrap()
});

/// Remaining total-loss buffer as seen by the risk gate.
pub static BUFFER_REMAINING: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pf_buffer_remaining",
        "Remaining total-loss buffer (currency)",
        &["instrument"]
    )
    .unwrap()
});

/// Signed open contracts (long positive).
pub static POSITION_CONTRACTS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pf_position_contracts",
        "Open contracts, signed by direction",
        &["instrument"]
    )
    .unwrap()
});

/// Reconciliation corrections by outcome kind.
pub static RECONCILE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pf_reconcile_corrections_total",
        "Total reconciliation corrections",
        &["instrument", "kind"]
    )
    .unwrap()
});

/// Venue request failures that were retried later.
pub static VENUE_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pf_venue_retries_total",
        "Total venue requests deferred for retry",
        &["operation", "kind"]
    )
    .unwrap()
});

/// Venue connection state (1 = connected).
pub static VENUE_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pf_venue_connected", "Venue connection state (1=connected)").unwrap()
});

/// Decision cycle duration.
pub static DECISION_CYCLE_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pf_decision_cycle_ms",
        "Bar poll to decision latency in milliseconds",
        &["instrument"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Event log write failures.
pub static EVENT_LOG_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pf_event_log_errors_total",
        "Total event log write failures",
        &["instrument"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn decision(instrument: &str, approved: bool) {
        let outcome = if approved { "approved" } else { "rejected" };
        DECISIONS_TOTAL
            .with_label_values(&[instrument, outcome])
            .inc();
    }

    pub fn breaker_blocked(breaker: &str, instrument: &str) {
        BREAKER_BLOCKS_TOTAL
            .with_label_values(&[breaker, instrument])
            .inc();
    }

    pub fn trade_closed(instrument: &str, exit_reason: &str, pnl: f64) {
        TRADES_CLOSED_TOTAL
            .with_label_values(&[instrument, exit_reason])
            .inc();
        TRADE_PNL
            .with_label_values(&[instrument, exit_reason])
            .observe(pnl);
    }

    pub fn realized_pnl_today(instrument: &str, pnl: f64) {
        REALIZED_PNL_TODAY.with_label_values(&[instrument]).set(pnl);
    }

    pub fn buffer_remaining(instrument: &str, buffer: f64) {
        BUFFER_REMAINING.with_label_values(&[instrument]).set(buffer);
    }

    pub fn position_contracts(instrument: &str, signed_contracts: f64) {
        POSITION_CONTRACTS
            .with_label_values(&[instrument])
            .set(signed_contracts);
    }

    pub fn reconcile_correction(instrument: &str, kind: &str) {
        RECONCILE_TOTAL.with_label_values(&[instrument, kind]).inc();
    }

    pub fn venue_retry(operation: &str, kind: &str) {
        VENUE_RETRIES_TOTAL
            .with_label_values(&[operation, kind])
            .inc();
    }

    pub fn venue_connected(connected: bool) {
        VENUE_CONNECTED.set(if connected { 1.0 } else { 0.0 });
    }

    pub fn decision_cycle(instrument: &str, elapsed_ms: f64) {
        DECISION_CYCLE_MS
            .with_label_values(&[instrument])
            .observe(elapsed_ms);
    }

    pub fn event_log_error(instrument: &str) {
        EVENT_LOG_ERRORS_TOTAL
            .with_label_values(&[instrument])
            .inc();
    }

    /// Text exposition of every registered metric.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
