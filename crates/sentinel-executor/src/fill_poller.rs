//! Fill confirmation poller.
//!
//! Bounded-retry polling until the exchange confirms an executed quantity.
//! Each attempt reads open orders first and falls back to order history, then
//! trade history, when the order is no longer open. The poller sleeps through
//! the injected clock between attempts, never after the last one.
//!
//! `Timeout` is a normal outcome: the order stays as-is for the reconciler.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sentinel_core::{DynClock, EventSink, LocalOrderId, Order, OrderId, OrderStatus, Price, Size};
use sentinel_exchange::{AdapterResult, DynExchange};
use sentinel_telemetry::Metrics;

use crate::error::{ExecutorError, ExecutorResult};
use crate::store::{OrderStore, OrderTruth};
use crate::truth;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillPollerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    1_000
}

impl Default for FillPollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Executed quantity confirmed. Also returned for a partial fill that
    /// closed before completing.
    Filled {
        executed_qty: Size,
        avg_price: Option<Price>,
        attempts: u32,
    },
    /// Closed without a fill.
    Terminal { status: OrderStatus, attempts: u32 },
    Timeout { attempts: u32 },
}

pub struct FillPoller {
    config: FillPollerConfig,
    exchange: DynExchange,
    store: Arc<OrderStore>,
    events: Arc<dyn EventSink>,
    clock: DynClock,
}

impl FillPoller {
    pub fn new(
        config: FillPollerConfig,
        exchange: DynExchange,
        store: Arc<OrderStore>,
        events: Arc<dyn EventSink>,
        clock: DynClock,
    ) -> Self {
        Self {
            config,
            exchange,
            store,
            events,
            clock,
        }
    }

    /// Poll until the order is confirmed filled, closes, or attempts run out.
    ///
    /// Transient adapter errors use up an attempt; terminal ones abort.
    pub async fn await_fill(&self, local_id: &LocalOrderId) -> ExecutorResult<FillOutcome> {
        let order = self
            .store
            .get(local_id)
            .ok_or_else(|| ExecutorError::OrderNotFound(local_id.to_string()))?;
        let order_id = order
            .order_id
            .clone()
            .ok_or_else(|| ExecutorError::OrderNotFound(local_id.to_string()))?;
        let interval = Duration::from_millis(self.config.interval_ms);

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                self.clock.sleep(interval).await;
            }

            let observed = match self.observe(&order, &order_id).await {
                Ok(Some(observed)) => observed,
                Ok(None) => {
                    debug!(order_id = %order_id, attempt, "Fill not confirmed yet");
                    continue;
                }
                Err(e) if e.is_transient() => {
                    warn!(order_id = %order_id, attempt, error = %e, "Transient error while polling");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(transition) = self.store.apply_truth(local_id, &observed) {
                truth::record_transition(
                    &self.store,
                    self.events.as_ref(),
                    &transition,
                    self.clock.now_ms(),
                );
            }

            match observed.status {
                OrderStatus::Filled => {
                    let Some(executed_qty) = observed.executed_qty.filter(|q| q.is_positive()) else {
                        debug!(order_id = %order_id, attempt, "FILLED without quantity, polling on");
                        continue;
                    };
                    info!(
                        order_id = %order_id,
                        executed_qty = %executed_qty,
                        attempts = attempt,
                        "Fill confirmed"
                    );
                    Metrics::fill_poll("filled", attempt);
                    return Ok(FillOutcome::Filled {
                        executed_qty,
                        avg_price: observed.avg_price,
                        attempts: attempt,
                    });
                }
                status if status.is_closed_unfilled() => {
                    let closed = self.store.get(local_id);
                    let partial = closed
                        .as_ref()
                        .and_then(|o| o.executed_qty.filter(|q| q.is_positive()));
                    if let (Some(closed), Some(executed_qty)) = (closed, partial) {
                        warn!(
                            order_id = %order_id,
                            status = %status,
                            executed_qty = %executed_qty,
                            requested_qty = %closed.requested_qty,
                            "Order closed after partial fill"
                        );
                        Metrics::fill_poll("partial", attempt);
                        return Ok(FillOutcome::Filled {
                            executed_qty,
                            avg_price: closed.avg_fill_price,
                            attempts: attempt,
                        });
                    }
                    info!(order_id = %order_id, status = %status, "Order closed without fill");
                    Metrics::fill_poll("terminal", attempt);
                    return Ok(FillOutcome::Terminal {
                        status,
                        attempts: attempt,
                    });
                }
                _ => {}
            }
        }

        warn!(
            order_id = %order_id,
            attempts = self.config.max_attempts,
            "Fill not confirmed, deferring to reconciler"
        );
        Metrics::fill_poll("timeout", self.config.max_attempts);
        Ok(FillOutcome::Timeout {
            attempts: self.config.max_attempts,
        })
    }

    async fn observe(
        &self,
        order: &Order,
        order_id: &OrderId,
    ) -> AdapterResult<Option<OrderTruth>> {
        let open = self.exchange.get_open_orders(&order.symbol).await?;
        if let Some(open_order) = truth::find_open(&open, order_id) {
            return Ok(Some(OrderTruth::from(open_order)));
        }
        truth::resolve_absent(self.exchange.as_ref(), order, order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::{Clock, EventType, ManualClock, Side, Symbol};
    use sentinel_exchange::{AdapterError, MockExchange, MockStep};
    use sentinel_persistence::{EventFilter, EventLog};

    use crate::placer::OrderPlacer;

    struct Harness {
        poller: FillPoller,
        placer: OrderPlacer,
        exchange: Arc<MockExchange>,
        store: Arc<OrderStore>,
        events: Arc<EventLog>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(0));
        let exchange = Arc::new(MockExchange::with_first_order_id(42));
        let store = Arc::new(OrderStore::new(clock.clone()));
        let events = Arc::new(EventLog::new());
        let placer = OrderPlacer::new(exchange.clone(), store.clone(), events.clone(), clock.clone());
        let poller = FillPoller::new(
            FillPollerConfig::default(),
            exchange.clone(),
            store.clone(),
            events.clone(),
            clock.clone(),
        );
        Harness {
            poller,
            placer,
            exchange,
            store,
            events,
            clock,
        }
    }

    async fn place(h: &Harness) -> LocalOrderId {
        h.placer
            .place(
                &Symbol::from("BTCUSDT"),
                Side::Buy,
                Size::new(dec!(5)),
                Price::new(dec!(100)),
            )
            .await
            .unwrap()
            .local_id
    }

    #[tokio::test]
    async fn test_filled_after_exactly_three_polls() {
        let h = harness();
        h.exchange.queue_script(vec![
            MockStep::active(),
            MockStep::active(),
            MockStep::filled(dec!(5), dec!(100)),
        ]);
        let local = place(&h).await;

        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert_eq!(
            outcome,
            FillOutcome::Filled {
                executed_qty: Size::new(dec!(5)),
                avg_price: Some(Price::new(dec!(100))),
                attempts: 3,
            }
        );
        assert_eq!(h.exchange.open_orders_calls(), 3);
        assert_eq!(h.clock.sleep_count(), 2);
        assert_eq!(h.clock.now_ms(), 2_000);

        let order = h.store.get(&local).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.executed_qty, Some(Size::new(dec!(5))));
        assert_eq!(
            h.events
                .count(&EventFilter::new().event_type(EventType::OrderFilled)),
            1
        );
    }

    #[tokio::test]
    async fn test_timeout_without_sleeping_after_last_attempt() {
        let h = harness();
        let local = place(&h).await;

        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert_eq!(outcome, FillOutcome::Timeout { attempts: 10 });
        assert_eq!(h.exchange.open_orders_calls(), 10);
        assert_eq!(h.clock.sleep_count(), 9);
        assert_eq!(h.store.get(&local).unwrap().status, OrderStatus::Active);
    }

    #[tokio::test]
    async fn test_cancelled_resolves_terminal_and_releases_cooldown() {
        let h = harness();
        h.exchange
            .queue_script(vec![MockStep::Closed(OrderStatus::Cancelled)]);
        let local = place(&h).await;
        let symbol = Symbol::from("BTCUSDT");
        assert!(h.store.last_order_time(&symbol).is_some());

        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert_eq!(
            outcome,
            FillOutcome::Terminal {
                status: OrderStatus::Cancelled,
                attempts: 1,
            }
        );
        assert!(h.store.last_order_time(&symbol).is_none());
        assert_eq!(
            h.events
                .count(&EventFilter::new().event_type(EventType::OrderCancelled)),
            1
        );
    }

    #[tokio::test]
    async fn test_partial_fill_then_cancel_reports_executed_qty() {
        let h = harness();
        h.exchange.queue_script(vec![
            MockStep::partial(Size::new(dec!(2))),
            MockStep::Closed(OrderStatus::Cancelled),
        ]);
        let local = place(&h).await;
        let symbol = Symbol::from("BTCUSDT");

        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert_eq!(
            outcome,
            FillOutcome::Filled {
                executed_qty: Size::new(dec!(2)),
                avg_price: None,
                attempts: 2,
            }
        );

        let order = h.store.get(&local).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.holds_position());
        // The position keeps the cooldown entry
        assert!(h.store.last_order_time(&symbol).is_some());
        assert_eq!(
            h.events
                .count(&EventFilter::new().event_type(EventType::OrderCancelled)),
            1
        );
    }

    #[tokio::test]
    async fn test_vanished_order_is_not_cancelled() {
        let h = harness();
        h.exchange.queue_script(vec![MockStep::Vanished]);
        let local = place(&h).await;

        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert_eq!(outcome, FillOutcome::Timeout { attempts: 10 });
        assert_eq!(h.store.get(&local).unwrap().status, OrderStatus::Active);
        assert!(h.exchange.history_calls() > 0);
    }

    #[tokio::test]
    async fn test_transient_error_uses_attempt() {
        let h = harness();
        h.exchange.queue_script(vec![
            MockStep::active(),
            MockStep::filled(dec!(5), dec!(100)),
        ]);
        let local = place(&h).await;
        let symbol = Symbol::from("BTCUSDT");

        h.exchange.set_open_orders_error(
            &symbol,
            Some(AdapterError::Transient("timeout".to_string())),
        );
        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert_eq!(outcome, FillOutcome::Timeout { attempts: 10 });
        // Failed reads never advance the order
        assert_eq!(h.store.get(&local).unwrap().status, OrderStatus::Active);

        h.exchange.set_open_orders_error(&symbol, None);
        let outcome = h.poller.await_fill(&local).await.unwrap();
        assert!(matches!(outcome, FillOutcome::Filled { attempts: 2, .. }));
    }
}
