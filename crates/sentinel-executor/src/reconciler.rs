//! Periodic reconciliation of local orders against exchange truth.
//!
//! Each cycle:
//! 1. non-terminal orders (oldest first, bounded) are grouped by symbol and
//!    synced from one open-orders query per symbol, falling back to order and
//!    trade history for orders no longer open
//! 2. filled primaries that are still unprotected get protection
//! 3. a live protection leg whose sibling filled is cancelled
//!
//! Errors never abort a cycle: a failed open-orders query skips the symbol, a
//! failed history lookup defers the order. Nothing is retried inline.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sentinel_core::{DynClock, EventSink, LocalOrderId, Order, OrderId, OrderStatus, Symbol};
use sentinel_exchange::DynExchange;
use sentinel_telemetry::Metrics;

use crate::protection::ProtectionOrchestrator;
use crate::store::{OrderStore, OrderTruth};
use crate::truth;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_orders_per_cycle")]
    pub max_orders_per_cycle: usize,
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_max_orders_per_cycle() -> usize {
    50
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_orders_per_cycle: default_max_orders_per_cycle(),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub transitions: usize,
    /// Absent from open orders but not yet explained by history.
    pub deferred: usize,
    pub skipped_symbols: usize,
    pub protected: usize,
    pub siblings_cancelled: usize,
    pub errors: usize,
}

impl ReconcileReport {
    pub fn is_quiet(&self) -> bool {
        self.transitions == 0
            && self.protected == 0
            && self.siblings_cancelled == 0
            && self.errors == 0
            && self.skipped_symbols == 0
    }
}

pub struct Reconciler {
    config: ReconcilerConfig,
    exchange: DynExchange,
    store: Arc<OrderStore>,
    events: Arc<dyn EventSink>,
    protection: Arc<ProtectionOrchestrator>,
    clock: DynClock,
    /// Legs with a cancel already sent, awaiting confirmation.
    cancel_requested: Mutex<HashSet<OrderId>>,
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        exchange: DynExchange,
        store: Arc<OrderStore>,
        events: Arc<dyn EventSink>,
        protection: Arc<ProtectionOrchestrator>,
        clock: DynClock,
    ) -> Self {
        Self {
            config,
            exchange,
            store,
            events,
            protection,
            clock,
            cancel_requested: Mutex::new(HashSet::new()),
        }
    }

    /// Run cycles every `interval_ms` until `shutdown` flips to true or its
    /// sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.interval_ms,
            max_orders = self.config.max_orders_per_cycle,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    if report.is_quiet() {
                        debug!(checked = report.checked, deferred = report.deferred, "Reconcile cycle");
                    } else {
                        info!(?report, "Reconcile cycle");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }

    /// One reconciliation cycle.
    pub async fn run_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut by_symbol: BTreeMap<Symbol, Vec<Order>> = BTreeMap::new();
        for order in self.store.non_terminal(self.config.max_orders_per_cycle) {
            by_symbol.entry(order.symbol.clone()).or_default().push(order);
        }
        for (symbol, orders) in &by_symbol {
            self.reconcile_symbol(symbol, orders, &mut report).await;
        }

        for primary in self.store.unprotected_positions() {
            self.protect(&primary.local_id, &mut report).await;
        }

        self.cancel_orphan_legs(&mut report).await;

        report
    }

    async fn reconcile_symbol(&self, symbol: &Symbol, orders: &[Order], report: &mut ReconcileReport) {
        let open = match self.exchange.get_open_orders(symbol).await {
            Ok(open) => open,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Open orders unavailable, skipping symbol this cycle");
                Metrics::cycle_error("reconciler", symbol.as_str());
                report.skipped_symbols += 1;
                return;
            }
        };

        for order in orders {
            report.checked += 1;
            let Some(order_id) = order.order_id.as_ref() else {
                continue;
            };

            let observed = match truth::find_open(&open, order_id) {
                Some(open_order) => OrderTruth::from(open_order),
                None => match truth::resolve_absent(self.exchange.as_ref(), order, order_id).await {
                    Ok(Some(observed)) => observed,
                    Ok(None) => {
                        debug!(order_id = %order_id, "Absent from open orders, unresolved");
                        report.deferred += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(order_id = %order_id, error = %e, "History lookup failed, deferring");
                        if !e.is_transient() {
                            report.errors += 1;
                        }
                        report.deferred += 1;
                        continue;
                    }
                },
            };

            let Some(transition) = self.store.apply_truth(&order.local_id, &observed) else {
                continue;
            };
            report.transitions += 1;
            Metrics::reconciler_transition(&transition.order.status.to_string());
            info!(
                order_id = %order_id,
                from = %transition.previous,
                to = %transition.order.status,
                "Reconciled order"
            );

            truth::record_transition(
                &self.store,
                self.events.as_ref(),
                &transition,
                self.clock.now_ms(),
            );

            if transition.opens_position() && transition.order.is_primary() {
                self.protect(&order.local_id, report).await;
            }
        }
    }

    async fn protect(&self, local_id: &LocalOrderId, report: &mut ReconcileReport) {
        match self.protection.protect_filled(local_id).await {
            Ok(Some(_)) => report.protected += 1,
            Ok(None) => {}
            // Already recorded and alerted by the orchestrator
            Err(_) => report.errors += 1,
        }
    }

    async fn cancel_orphan_legs(&self, report: &mut ReconcileReport) {
        let legs: Vec<Order> = self
            .store
            .non_terminal(usize::MAX)
            .into_iter()
            .filter(|o| o.role.is_protection())
            .collect();

        for leg in legs {
            let (Some(parent), Some(leg_id)) = (&leg.parent_order_id, &leg.order_id) else {
                continue;
            };
            let sibling_filled = self
                .store
                .children_of(parent)
                .iter()
                .any(|s| s.local_id != leg.local_id && s.status == OrderStatus::Filled);
            if !sibling_filled || self.cancel_requested.lock().contains(leg_id) {
                continue;
            }

            match self.exchange.cancel_order(&leg.symbol, leg_id).await {
                Ok(()) => {
                    self.cancel_requested.lock().insert(leg_id.clone());
                    report.siblings_cancelled += 1;
                    info!(
                        order_id = %leg_id,
                        parent = %parent,
                        role = %leg.role,
                        "Sibling leg filled, cancel requested"
                    );
                }
                Err(e) => {
                    warn!(order_id = %leg_id, error = %e, "Failed to cancel orphaned leg");
                    Metrics::cycle_error("reconciler", leg.symbol.as_str());
                    report.errors += 1;
                }
            }
        }

        // Confirmed cancels no longer need tracking
        self.cancel_requested.lock().retain(|id| {
            self.store
                .find_by_order_id(id)
                .map_or(false, |o| !o.is_terminal())
        });
    }
}
