//! Application orchestration.
//!
//! Owns every engine component and drives two loops:
//! - the scheduler: one cycle per tick, every configured symbol evaluated
//!   concurrently through the decision pipeline
//! - the reconciler: its own task on its own interval
//!
//! The symbol and strategy sections of the config file are re-read at the
//! start of every cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use sentinel_core::{DynClock, EventSink, Symbol, SystemClock};
use sentinel_exchange::{DynExchange, DynNotifier, LogNotifier, PaperExchange};
use sentinel_executor::{
    ChannelConfig, DecisionPipeline, FillPoller, OrderPlacer, OrderStore, PipelineOutcome,
    ProtectionOrchestrator, Reconciler, SettingsRegistry,
};
use sentinel_gates::{SignalGate, ThrottleStore, TradeGate};
use sentinel_persistence::EventLog;
use sentinel_telemetry::Metrics;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::source::{DynSignalSource, FileSignalSource};

/// External collaborators.
pub struct Components {
    pub exchange: DynExchange,
    pub notifier: DynNotifier,
    pub source: DynSignalSource,
    pub clock: DynClock,
}

impl Components {
    /// Paper exchange, log notifier, file signals, wall clock.
    pub fn paper(config: &AppConfig) -> Self {
        Self {
            exchange: Arc::new(PaperExchange::new(config.paper.fill_after_polls)),
            notifier: Arc::new(LogNotifier),
            source: Arc::new(FileSignalSource::new(&config.signals_path)),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Result of one scheduler cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub evaluated: usize,
    /// Snapshots for symbols that are not configured.
    pub skipped: usize,
    pub errors: usize,
    pub outcomes: Vec<(Symbol, PipelineOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, symbol: &Symbol) -> Option<&PipelineOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, outcome)| outcome)
    }
}

pub struct Application {
    config: AppConfig,
    /// Re-read every cycle when set.
    config_path: Option<String>,
    persist: bool,
    source: DynSignalSource,
    events: Arc<EventLog>,
    store: Arc<OrderStore>,
    throttle: Arc<ThrottleStore>,
    settings: Arc<SettingsRegistry>,
    pipeline: Arc<DecisionPipeline>,
    reconciler: Arc<Reconciler>,
    channels: HashMap<Symbol, ChannelConfig>,
}

impl Application {
    /// Production wiring: paper exchange and on-disk journals.
    pub fn new(config: AppConfig, config_path: Option<String>) -> AppResult<Self> {
        let components = Components::paper(&config);
        Self::build(config, config_path, components, true)
    }

    /// In-memory wiring around the given collaborators. Nothing is written to
    /// disk and the config is never reloaded.
    pub fn with_components(config: AppConfig, components: Components) -> AppResult<Self> {
        Self::build(config, None, components, false)
    }

    fn build(
        config: AppConfig,
        config_path: Option<String>,
        components: Components,
        persist: bool,
    ) -> AppResult<Self> {
        let Components {
            exchange,
            notifier,
            source,
            clock,
        } = components;
        let data_dir = config.persistence.data_dir.as_str();
        let buffer_size = config.persistence.buffer_size;

        let (events, store, throttle) = if persist {
            std::fs::create_dir_all(data_dir)?;
            (
                EventLog::with_journal(data_dir, buffer_size),
                OrderStore::with_journal(clock.clone(), data_dir, buffer_size),
                ThrottleStore::load_snapshot(&config.persistence.throttle_snapshot_path())?,
            )
        } else {
            (
                EventLog::new(),
                OrderStore::new(clock.clone()),
                ThrottleStore::new(),
            )
        };
        let events = Arc::new(events);
        let store = Arc::new(store);
        let throttle = Arc::new(throttle);
        let sink: Arc<dyn EventSink> = events.clone();

        let settings = Arc::new(SettingsRegistry::new());
        settings.replace_all(config.symbol_settings());

        let signal_gate = Arc::new(SignalGate::new(
            config.signal.clone(),
            throttle.clone(),
            sink.clone(),
            clock.clone(),
        ));
        let trade_gate = Arc::new(TradeGate::new(
            config.trade.clone(),
            sink.clone(),
            clock.clone(),
        ));
        let placer = Arc::new(OrderPlacer::new(
            exchange.clone(),
            store.clone(),
            sink.clone(),
            clock.clone(),
        ));
        let poller = Arc::new(FillPoller::new(
            config.fill_poll.clone(),
            exchange.clone(),
            store.clone(),
            sink.clone(),
            clock.clone(),
        ));
        let protection = Arc::new(ProtectionOrchestrator::new(
            placer.clone(),
            store.clone(),
            sink.clone(),
            notifier.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            config.reconciler_config(),
            exchange,
            store.clone(),
            sink,
            protection.clone(),
            clock,
        ));
        let pipeline = Arc::new(DecisionPipeline::new(
            signal_gate,
            trade_gate,
            store.clone(),
            placer,
            poller,
            protection,
            settings.clone(),
            notifier,
        ));

        let channels = config.channels();
        info!(
            mode = ?config.mode,
            symbols = channels.len(),
            persist,
            "Application initialized"
        );

        Ok(Self {
            config,
            config_path,
            persist,
            source,
            events,
            store,
            throttle,
            settings,
            pipeline,
            reconciler,
            channels,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    pub fn throttle(&self) -> &Arc<ThrottleStore> {
        &self.throttle
    }

    pub fn settings(&self) -> &Arc<SettingsRegistry> {
        &self.settings
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Run until Ctrl-C.
    pub async fn run(mut self) -> AppResult<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = tokio::spawn(self.reconciler.clone().run(shutdown_rx));

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            mode = ?self.config.mode,
            tick_interval_ms = self.config.tick_interval_ms,
            "Entering scheduler loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    debug!(
                        evaluated = report.evaluated,
                        skipped = report.skipped,
                        errors = report.errors,
                        "Cycle complete"
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let _ = shutdown_tx.send(true);
        if let Err(e) = reconciler.await {
            warn!(error = %e, "Reconciler task ended abnormally");
        }
        self.shutdown();
        Ok(())
    }

    /// One scheduler cycle over every snapshot the source yields.
    ///
    /// A failing symbol is logged and counted; the rest of the cycle proceeds.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.reload_config();

        let mut report = CycleReport::default();
        let snapshots = match self.source.fetch().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!(error = %e, "Signal source failed, skipping cycle");
                Metrics::cycle_error("source", "all");
                report.errors += 1;
                return report;
            }
        };

        let trading = self.config.is_trading();
        let mut tasks = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let Some(channel) = self.channels.get(&snapshot.symbol).cloned() else {
                debug!(symbol = %snapshot.symbol, "Snapshot for unconfigured symbol");
                report.skipped += 1;
                continue;
            };
            let pipeline = self.pipeline.clone();
            tasks.push(async move {
                let decision = snapshot.decision();
                let result = pipeline
                    .on_decision(&decision, snapshot.portfolio_value, &channel, trading)
                    .await;
                (snapshot.symbol, result)
            });
        }

        for (symbol, result) in join_all(tasks).await {
            match result {
                Ok(outcome) => {
                    report.evaluated += 1;
                    report.outcomes.push((symbol, outcome));
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Symbol evaluation failed");
                    Metrics::cycle_error("pipeline", symbol.as_str());
                    report.errors += 1;
                }
            }
        }

        self.save_throttle();
        report
    }

    /// Apply the symbol and strategy sections of `new`.
    ///
    /// A strategy whose parameters changed forces the next signal on both
    /// sides of every symbol using it. Runtime settings (mode, intervals,
    /// gate limits) stay as loaded at startup.
    pub fn apply_config(&mut self, new: AppConfig) {
        let channels = new.channels();
        for (symbol, channel) in &channels {
            self.throttle.apply_config_hash(
                symbol,
                &channel.strategy.strategy_key,
                channel.strategy.config_hash,
            );
        }
        self.settings.replace_all(new.symbol_settings());
        self.channels = channels;
        self.config.strategies = new.strategies;
        self.config.symbols = new.symbols;
    }

    fn reload_config(&mut self) {
        let Some(path) = self.config_path.clone() else {
            return;
        };
        match AppConfig::from_file(&path) {
            Ok(new) => self.apply_config(new),
            Err(e) => warn!(path = %path, error = %e, "Config reload failed, keeping previous"),
        }
    }

    fn save_throttle(&self) {
        if !self.persist {
            return;
        }
        let path = self.config.persistence.throttle_snapshot_path();
        if let Err(e) = self.throttle.save_snapshot(&path) {
            warn!(path = %path.display(), error = %e, "Failed to save throttle snapshot");
        }
    }

    fn shutdown(&self) {
        self.store.flush();
        self.events.flush();
        self.save_throttle();
        match Metrics::render() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        info!(events = self.events.len(), orders = self.store.len(), "Application stopped");
    }
}
