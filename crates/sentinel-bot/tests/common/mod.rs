//! Shared harness: an application wired to a scripted exchange, a recording
//! notifier, an in-memory signal source and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use sentinel_bot::{AppConfig, Application, Components, MemorySignalSource, SignalSnapshot};
use sentinel_core::{EventType, ManualClock, ReasonCode};
use sentinel_exchange::{MockExchange, RecordingNotifier};
use sentinel_persistence::EventFilter;

pub const START_MS: u64 = 1_700_000_000_000;

pub struct TestApp {
    pub app: Application,
    pub exchange: Arc<MockExchange>,
    pub notifier: Arc<RecordingNotifier>,
    pub source: Arc<MemorySignalSource>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        let exchange = Arc::new(MockExchange::with_first_order_id(42));
        let notifier = Arc::new(RecordingNotifier::new());
        let source = Arc::new(MemorySignalSource::new());
        let clock = Arc::new(ManualClock::new(START_MS));

        let app = Application::with_components(
            config,
            Components {
                exchange: exchange.clone(),
                notifier: notifier.clone(),
                source: source.clone(),
                clock: clock.clone(),
            },
        )
        .expect("application builds");

        Self {
            app,
            exchange,
            notifier,
            source,
            clock,
        }
    }

    pub fn signals(&self, snapshots: Vec<SignalSnapshot>) {
        self.source.set(snapshots);
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.app
            .events()
            .count(&EventFilter::new().event_type(event_type))
    }

    pub fn reasons(&self, event_type: EventType) -> Vec<ReasonCode> {
        self.app
            .events()
            .query(&EventFilter::new().event_type(event_type))
            .into_iter()
            .map(|e| e.reason_code)
            .collect()
    }
}

/// Config with one strategy and the given symbols, all sharing BTC-like
/// precision (step 0.001, min 0.01, 3 decimals, tick 0.01).
pub fn config(mode: &str, symbols: &[(&str, bool)]) -> AppConfig {
    config_with_pct(mode, symbols, "1.0")
}

pub fn config_with_pct(mode: &str, symbols: &[(&str, bool)], min_pct: &str) -> AppConfig {
    let mut toml = format!(
        r#"
mode = "{mode}"

[strategies.momentum]
min_price_change_pct = "{min_pct}"
sl_pct = "2"
tp_pct = "4"
"#
    );
    for (symbol, trade_enabled) in symbols {
        toml.push_str(&format!(
            r#"
[[symbols]]
symbol = "{symbol}"
strategy = "momentum"
trade_enabled = {trade_enabled}
trade_amount = "100"
step_size = "0.001"
min_qty = "0.01"
qty_decimals = 3
tick_size = "0.01"
"#
        ));
    }
    AppConfig::from_toml(&toml).expect("valid test config")
}
