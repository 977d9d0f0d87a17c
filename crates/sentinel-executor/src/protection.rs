//! Stop-loss / take-profit orchestration.
//!
//! After a primary fill is confirmed, two reduce-only legs are placed on the
//! opposite side, both sized to the normalized executed quantity:
//! - stop-loss: stop order triggered `sl_pct` against the average fill price
//! - take-profit: limit order `tp_pct` in favour of it
//!
//! A primary is claimed (UNPROTECTED -> PENDING) before any leg is placed, so
//! it is protected at most once even when the poller and the reconciler both
//! observe its fill. Every failure records SLTP_FAILED and raises a
//! high-priority notification: the position is unprotected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use sentinel_core::{
    DynClock, EventDraft, EventSink, EventType, LocalOrderId, Order, OrderId, OrderRole,
    OrderType, Price, ProtectionState, ReasonCode, Side, Size, Symbol,
};
use sentinel_exchange::{DynNotifier, Notification, OrderRequest};
use sentinel_telemetry::Metrics;

use crate::error::{ExecutorError, ExecutorResult};
use crate::normalize::InstrumentSpec;
use crate::placer::OrderPlacer;
use crate::store::OrderStore;

/// Protection distances in percent of the average fill price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionParams {
    pub sl_pct: Decimal,
    pub tp_pct: Decimal,
}

/// Per-symbol execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSettings {
    pub spec: InstrumentSpec,
    /// None disables protection placement (failures are still recorded).
    pub protection: Option<ProtectionParams>,
}

/// Current settings per symbol. Replaced wholesale on config reload.
#[derive(Debug, Default)]
pub struct SettingsRegistry {
    inner: RwLock<HashMap<Symbol, SymbolSettings>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: Symbol, settings: SymbolSettings) {
        self.inner.write().insert(symbol, settings);
    }

    pub fn replace_all(&self, settings: HashMap<Symbol, SymbolSettings>) {
        *self.inner.write() = settings;
    }

    pub fn get(&self, symbol: &Symbol) -> Option<SymbolSettings> {
        self.inner.read().get(symbol).cloned()
    }
}

/// The two placed legs.
#[derive(Debug, Clone)]
pub struct ProtectionPair {
    pub stop_loss: Order,
    pub take_profit: Order,
}

/// Stop-loss and take-profit prices for a fill at `avg_price`.
pub fn protection_prices(
    side: Side,
    avg_price: Price,
    params: &ProtectionParams,
    tick_size: Price,
) -> (Price, Price) {
    let (sl, tp) = match side {
        Side::Buy => (avg_price.offset_pct(-params.sl_pct), avg_price.offset_pct(params.tp_pct)),
        Side::Sell => (avg_price.offset_pct(params.sl_pct), avg_price.offset_pct(-params.tp_pct)),
    };
    (sl.round_to_tick(tick_size), tp.round_to_tick(tick_size))
}

pub struct ProtectionOrchestrator {
    placer: Arc<OrderPlacer>,
    store: Arc<OrderStore>,
    events: Arc<dyn EventSink>,
    notifier: DynNotifier,
    settings: Arc<SettingsRegistry>,
    clock: DynClock,
}

impl ProtectionOrchestrator {
    pub fn new(
        placer: Arc<OrderPlacer>,
        store: Arc<OrderStore>,
        events: Arc<dyn EventSink>,
        notifier: DynNotifier,
        settings: Arc<SettingsRegistry>,
        clock: DynClock,
    ) -> Self {
        Self {
            placer,
            store,
            events,
            notifier,
            settings,
            clock,
        }
    }

    /// Claim and protect a primary holding a position: filled, or partially
    /// filled and then closed. Legs are sized to the executed quantity.
    ///
    /// Ok(None) if the order holds no position or is already claimed (someone
    /// else protected it or is doing so).
    pub async fn protect_filled(
        &self,
        local_id: &LocalOrderId,
    ) -> ExecutorResult<Option<ProtectionPair>> {
        let Some(primary) = self.store.try_claim_protection(local_id) else {
            return Ok(None);
        };
        let Some(executed_qty) = primary.executed_qty else {
            return Err(self
                .fail(&primary, ReasonCode::ProtectionNormalizationFailed, "no executed quantity")
                .await);
        };

        let params = self
            .settings
            .get(&primary.symbol)
            .and_then(|s| s.protection);
        let Some(params) = params else {
            return Err(self
                .fail(
                    &primary,
                    ReasonCode::ProtectionConfigMissing,
                    "no stop-loss/take-profit settings",
                )
                .await);
        };

        self.create_protection(&primary, executed_qty, &params)
            .await
            .map(Some)
    }

    /// Place both legs for `primary`. The caller must hold the claim.
    pub async fn create_protection(
        &self,
        primary: &Order,
        executed_qty: Size,
        params: &ProtectionParams,
    ) -> ExecutorResult<ProtectionPair> {
        let Some(settings) = self.settings.get(&primary.symbol) else {
            return Err(self
                .fail(primary, ReasonCode::ProtectionConfigMissing, "no instrument spec")
                .await);
        };
        let spec = settings.spec;

        let qty = match spec.normalize_qty(executed_qty) {
            Ok(qty) => qty,
            Err(e) => {
                return Err(self
                    .fail(primary, ReasonCode::ProtectionNormalizationFailed, e.to_string())
                    .await)
            }
        };

        let avg_price = match primary.avg_fill_price {
            Some(p) => p,
            None => {
                warn!(
                    order_id = %primary.display_id(),
                    price = %primary.price,
                    "No average fill price reported, using order price"
                );
                primary.price
            }
        };
        let (sl_price, tp_price) =
            protection_prices(primary.side, avg_price, params, spec.tick_size);
        let exit_side = primary.side.opposite();

        let stop_loss = self
            .placer
            .submit(
                OrderRequest {
                    symbol: primary.symbol.clone(),
                    side: exit_side,
                    qty,
                    price: sl_price,
                    order_type: OrderType::StopLoss,
                    trigger_price: Some(sl_price),
                    reduce_only: true,
                },
                OrderRole::StopLoss,
                primary.order_id.clone(),
            )
            .await;
        let stop_loss = match stop_loss {
            Ok(order) => order,
            Err(e) => {
                return Err(self
                    .fail(primary, ReasonCode::StopLossFailed, e.to_string())
                    .await)
            }
        };

        let take_profit = self
            .placer
            .submit(
                OrderRequest {
                    symbol: primary.symbol.clone(),
                    side: exit_side,
                    qty,
                    price: tp_price,
                    order_type: OrderType::Limit,
                    trigger_price: None,
                    reduce_only: true,
                },
                OrderRole::TakeProfit,
                primary.order_id.clone(),
            )
            .await;
        let take_profit = match take_profit {
            Ok(order) => order,
            Err(e) => {
                // The stop-loss leg stays live: partial cover beats none
                let detail = format!(
                    "{e}; stop-loss {} remains open",
                    stop_loss.display_id()
                );
                return Err(self.fail(primary, ReasonCode::TakeProfitFailed, detail).await);
            }
        };

        let (Some(sl_id), Some(tp_id)) = (stop_loss.order_id.clone(), take_profit.order_id.clone())
        else {
            return Err(self
                .fail(primary, ReasonCode::StopLossFailed, "leg acknowledged without id")
                .await);
        };

        self.store.set_protection(
            &primary.local_id,
            ProtectionState::Protected {
                stop_loss: sl_id.clone(),
                take_profit: tp_id.clone(),
            },
        );
        Metrics::protection_outcome(primary.symbol.as_str(), ReasonCode::ProtectionPlaced.as_str());
        self.events.record(
            EventDraft::new(
                primary.symbol.clone(),
                primary.side,
                EventType::SltpCreated,
                ReasonCode::ProtectionPlaced,
                self.clock.now_ms(),
            )
            .with_order_id(primary.order_id.clone())
            .with_linked(vec![sl_id.clone(), tp_id.clone()])
            .with_price(avg_price),
        );

        info!(
            order_id = %primary.display_id(),
            stop_loss = %sl_id,
            sl_price = %sl_price,
            take_profit = %tp_id,
            tp_price = %tp_price,
            qty = %qty,
            "Protection placed"
        );

        Ok(ProtectionPair {
            stop_loss,
            take_profit,
        })
    }

    async fn fail(
        &self,
        primary: &Order,
        reason: ReasonCode,
        detail: impl Into<String>,
    ) -> ExecutorError {
        let detail = detail.into();

        self.store.set_protection(
            &primary.local_id,
            ProtectionState::Failed {
                reason: format!("{reason}: {detail}"),
            },
        );
        Metrics::protection_outcome(primary.symbol.as_str(), reason.as_str());
        self.events.record(
            EventDraft::new(
                primary.symbol.clone(),
                primary.side,
                EventType::SltpFailed,
                reason,
                self.clock.now_ms(),
            )
            .with_order_id(primary.order_id.clone())
            .with_detail(detail.clone()),
        );

        error!(
            order_id = %primary.display_id(),
            symbol = %primary.symbol,
            reason = %reason,
            detail = %detail,
            "Protection failed, position unprotected"
        );

        let message = format!(
            "UNPROTECTED POSITION {} {} order {}: {} ({})",
            primary.symbol,
            primary.side,
            primary.display_id(),
            reason,
            detail
        );
        if let Err(e) = self.notifier.notify(Notification::high(message)).await {
            warn!(error = %e, "Failed to send protection failure notification");
        }

        ExecutorError::ProtectionFailed {
            order_id: primary
                .order_id
                .clone()
                .unwrap_or_else(|| OrderId::new(primary.local_id.as_str())),
            reason: format!("{reason}: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::{ManualClock, OrderStatus};
    use sentinel_exchange::{AdapterError, MockExchange, Priority, RecordingNotifier};
    use sentinel_persistence::{EventFilter, EventLog};

    use crate::store::OrderTruth;

    struct Harness {
        orchestrator: ProtectionOrchestrator,
        placer: Arc<OrderPlacer>,
        exchange: Arc<MockExchange>,
        store: Arc<OrderStore>,
        events: Arc<EventLog>,
        notifier: Arc<RecordingNotifier>,
    }

    fn spec() -> InstrumentSpec {
        InstrumentSpec {
            step_size: Size::new(dec!(0.001)),
            min_qty: Size::new(dec!(0.01)),
            qty_decimals: 3,
            tick_size: Price::new(dec!(0.01)),
        }
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(0));
        let exchange = Arc::new(MockExchange::with_first_order_id(42));
        let store = Arc::new(OrderStore::new(clock.clone()));
        let events = Arc::new(EventLog::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let settings = Arc::new(SettingsRegistry::new());
        settings.set(
            Symbol::from("BTCUSDT"),
            SymbolSettings {
                spec: spec(),
                protection: Some(ProtectionParams {
                    sl_pct: dec!(2),
                    tp_pct: dec!(5),
                }),
            },
        );
        let placer = Arc::new(OrderPlacer::new(
            exchange.clone(),
            store.clone(),
            events.clone(),
            clock.clone(),
        ));
        let orchestrator = ProtectionOrchestrator::new(
            placer.clone(),
            store.clone(),
            events.clone(),
            notifier.clone(),
            settings,
            clock,
        );
        Harness {
            orchestrator,
            placer,
            exchange,
            store,
            events,
            notifier,
        }
    }

    async fn filled_primary(h: &Harness, side: Side, qty: Size) -> LocalOrderId {
        let order = h
            .placer
            .place(&Symbol::from("BTCUSDT"), side, Size::new(dec!(10)), Price::new(dec!(10)))
            .await
            .unwrap();
        h.store.apply_truth(
            &order.local_id,
            &OrderTruth {
                status: OrderStatus::Filled,
                executed_qty: Some(qty),
                avg_price: Some(Price::new(dec!(100))),
            },
        );
        order.local_id
    }

    #[test]
    fn test_prices_follow_side() {
        let params = ProtectionParams {
            sl_pct: dec!(2),
            tp_pct: dec!(5),
        };
        let tick = Price::new(dec!(0.01));
        assert_eq!(
            protection_prices(Side::Buy, Price::new(dec!(100)), &params, tick),
            (Price::new(dec!(98)), Price::new(dec!(105)))
        );
        assert_eq!(
            protection_prices(Side::Sell, Price::new(dec!(100)), &params, tick),
            (Price::new(dec!(102)), Price::new(dec!(95)))
        );
    }

    #[tokio::test]
    async fn test_protect_filled_places_both_legs() {
        let h = harness();
        let local = filled_primary(&h, Side::Buy, Size::new(dec!(9.87654))).await;

        let pair = h.orchestrator.protect_filled(&local).await.unwrap().unwrap();

        assert_eq!(pair.stop_loss.side, Side::Sell);
        assert_eq!(pair.stop_loss.order_type, OrderType::StopLoss);
        assert_eq!(pair.stop_loss.trigger_price, Some(Price::new(dec!(98))));
        assert_eq!(pair.take_profit.price, Price::new(dec!(105)));
        assert_eq!(pair.take_profit.requested_qty.to_string(), "9.876");
        assert_eq!(pair.stop_loss.parent_order_id, Some(OrderId::from(42u64)));

        let placed = h.exchange.placed();
        assert_eq!(placed.len(), 3);
        assert!(placed[1].reduce_only && placed[2].reduce_only);

        let created = h
            .events
            .query(&EventFilter::new().event_type(EventType::SltpCreated));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].linked_order_ids.len(), 2);
        assert!(matches!(
            h.store.get(&local).unwrap().protection,
            ProtectionState::Protected { .. }
        ));
    }

    #[tokio::test]
    async fn test_protect_filled_is_claimed_once() {
        let h = harness();
        let local = filled_primary(&h, Side::Buy, Size::new(dec!(1))).await;

        assert!(h.orchestrator.protect_filled(&local).await.unwrap().is_some());
        assert!(h.orchestrator.protect_filled(&local).await.unwrap().is_none());
        assert_eq!(h.exchange.placed().len(), 3);
    }

    #[tokio::test]
    async fn test_take_profit_failure_is_loud() {
        let h = harness();
        let local = filled_primary(&h, Side::Buy, Size::new(dec!(1))).await;
        h.exchange.queue_place_result(Ok(OrderStatus::Active));
        h.exchange
            .queue_place_result(Err(AdapterError::Terminal("rejected".to_string())));

        let err = h.orchestrator.protect_filled(&local).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ProtectionFailed { .. }));

        let failed = h.events.query(&EventFilter::new().event_type(EventType::SltpFailed));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reason_code, ReasonCode::TakeProfitFailed);

        let alerts = h.notifier.high_priority();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, Priority::High);
        assert!(matches!(
            h.store.get(&local).unwrap().protection,
            ProtectionState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_normalization_failure_blocks_protection() {
        let h = harness();
        let local = filled_primary(&h, Side::Buy, Size::new(dec!(0.005))).await;

        assert!(h.orchestrator.protect_filled(&local).await.is_err());
        assert_eq!(h.exchange.placed().len(), 1);

        let failed = h.events.query(&EventFilter::new().event_type(EventType::SltpFailed));
        assert_eq!(failed[0].reason_code, ReasonCode::ProtectionNormalizationFailed);
        assert_eq!(h.notifier.high_priority().len(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_mask_result() {
        let h = harness();
        h.notifier.set_failing(true);
        let local = filled_primary(&h, Side::Buy, Size::new(dec!(0.005))).await;

        let err = h.orchestrator.protect_filled(&local).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ProtectionFailed { .. }));
        assert_eq!(
            h.events
                .count(&EventFilter::new().event_type(EventType::SltpFailed)),
            1
        );
    }
}
