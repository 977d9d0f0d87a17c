//! Prometheus metrics for sentinel.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught at first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};

use crate::error::TelemetryResult;

/// Signal gate outcomes.
/// Labels: symbol, side, outcome (emit / skip reason code)
pub static ALERT_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_alert_decisions_total",
        "Signal gate decisions",
        &["symbol", "side", "outcome"]
    )
    .unwrap()
});

/// Trade gate outcomes.
pub static TRADE_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_trade_decisions_total",
        "Trade gate decisions",
        &["symbol", "side", "outcome"]
    )
    .unwrap()
});

/// Placement outcomes (created / failed reason).
pub static ORDER_OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_order_outcomes_total",
        "Order placement outcomes",
        &["symbol", "outcome"]
    )
    .unwrap()
});

/// Protection outcomes (created / failed reason).
pub static PROTECTION_OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_protection_outcomes_total",
        "Stop-loss / take-profit placement outcomes",
        &["symbol", "outcome"]
    )
    .unwrap()
});

/// Poll attempts used per fill confirmation.
/// Labels: result (filled / terminal / timeout)
pub static FILL_POLL_ATTEMPTS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sentinel_fill_poll_attempts",
        "Poll attempts until fill confirmation resolved",
        &["result"],
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 20.0]
    )
    .unwrap()
});

/// Status transitions applied by the reconciler.
pub static RECONCILER_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_reconciler_transitions_total",
        "Order status transitions applied by the reconciler",
        &["status"]
    )
    .unwrap()
});

/// Errors caught per symbol in the scheduler or reconciler.
pub static CYCLE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_cycle_errors_total",
        "Errors caught by the scheduler or reconciler loop",
        &["component", "symbol"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn alert_decision(symbol: &str, side: &str, outcome: &str) {
        ALERT_DECISIONS_TOTAL
            .with_label_values(&[symbol, side, outcome])
            .inc();
    }

    pub fn trade_decision(symbol: &str, side: &str, outcome: &str) {
        TRADE_DECISIONS_TOTAL
            .with_label_values(&[symbol, side, outcome])
            .inc();
    }

    pub fn order_outcome(symbol: &str, outcome: &str) {
        ORDER_OUTCOMES_TOTAL
            .with_label_values(&[symbol, outcome])
            .inc();
    }

    pub fn protection_outcome(symbol: &str, outcome: &str) {
        PROTECTION_OUTCOMES_TOTAL
            .with_label_values(&[symbol, outcome])
            .inc();
    }

    /// Record how many attempts a fill confirmation took.
    pub fn fill_poll(result: &str, attempts: u32) {
        FILL_POLL_ATTEMPTS
            .with_label_values(&[result])
            .observe(f64::from(attempts));
    }

    pub fn reconciler_transition(status: &str) {
        RECONCILER_TRANSITIONS_TOTAL
            .with_label_values(&[status])
            .inc();
    }

    pub fn cycle_error(component: &str, symbol: &str) {
        CYCLE_ERRORS_TOTAL
            .with_label_values(&[component, symbol])
            .inc();
    }

    /// Render the default registry in Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
