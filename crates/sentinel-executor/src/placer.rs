//! Order placer.
//!
//! Submits orders and turns acknowledgements into `Order` rows. The row's
//! status is whatever the exchange acknowledged (usually NEW or ACTIVE); a
//! placement response is never read as a fill.

use std::sync::Arc;

use tracing::{info, warn};

use sentinel_core::{
    DynClock, EventDraft, EventSink, EventType, LocalOrderId, Order, OrderId, OrderRole,
    OrderType, Price, ProtectionState, ReasonCode, Side, Size, Symbol,
};
use sentinel_exchange::{AdapterError, DynExchange, OrderRequest};
use sentinel_telemetry::Metrics;

use crate::error::ExecutorResult;
use crate::store::OrderStore;

pub struct OrderPlacer {
    exchange: DynExchange,
    store: Arc<OrderStore>,
    events: Arc<dyn EventSink>,
    clock: DynClock,
}

impl OrderPlacer {
    pub fn new(
        exchange: DynExchange,
        store: Arc<OrderStore>,
        events: Arc<dyn EventSink>,
        clock: DynClock,
    ) -> Self {
        Self {
            exchange,
            store,
            events,
            clock,
        }
    }

    /// Place a primary limit order.
    ///
    /// Success records ORDER_CREATED and stamps the symbol's cooldown ledger.
    /// An adapter error records ORDER_FAILED with the raw error and is
    /// returned; nothing further is attempted for this order.
    pub async fn place(
        &self,
        symbol: &Symbol,
        side: Side,
        qty: Size,
        price: Price,
    ) -> ExecutorResult<Order> {
        let request = OrderRequest {
            symbol: symbol.clone(),
            side,
            qty,
            price,
            order_type: OrderType::Limit,
            trigger_price: None,
            reduce_only: false,
        };

        let order = match self.submit(request, OrderRole::Primary, None).await {
            Ok(order) => order,
            Err(e) => {
                let reason = if e.is_transient() {
                    ReasonCode::AdapterTransient
                } else {
                    ReasonCode::AdapterTerminal
                };
                warn!(symbol = %symbol, side = %side, error = %e, "Order placement failed");
                self.record_failure(symbol, side, price, reason, e.to_string());
                return Err(e.into());
            }
        };

        self.store
            .record_order_time(symbol, &order.local_id, order.created_at);
        Metrics::order_outcome(symbol.as_str(), ReasonCode::OrderAccepted.as_str());
        self.events.record(
            EventDraft::new(
                symbol.clone(),
                side,
                EventType::OrderCreated,
                ReasonCode::OrderAccepted,
                order.created_at,
            )
            .with_order_id(order.order_id.clone())
            .with_price(price),
        );

        info!(
            order_id = %order.display_id(),
            symbol = %symbol,
            side = %side,
            qty = %qty,
            price = %price,
            status = %order.status,
            "Order placed"
        );
        Ok(order)
    }

    /// Submit any order and store the acknowledged row. Records no events.
    pub async fn submit(
        &self,
        request: OrderRequest,
        role: OrderRole,
        parent_order_id: Option<OrderId>,
    ) -> Result<Order, AdapterError> {
        let ack = self.exchange.place_order(request.clone()).await?;

        let now = self.clock.now_ms();
        let order = Order {
            local_id: LocalOrderId::new(),
            order_id: Some(ack.order_id),
            symbol: request.symbol,
            side: request.side,
            role,
            order_type: request.order_type,
            requested_qty: request.qty,
            executed_qty: None,
            price: request.price,
            trigger_price: request.trigger_price,
            avg_fill_price: None,
            status: ack.status,
            created_at: now,
            updated_at: now,
            parent_order_id,
            protection: if role == OrderRole::Primary {
                ProtectionState::Unprotected
            } else {
                ProtectionState::NotApplicable
            },
        };
        self.store.insert(order.clone());
        Ok(order)
    }

    /// Record ORDER_FAILED for an order that never reached the exchange or was
    /// refused by it.
    pub fn record_failure(
        &self,
        symbol: &Symbol,
        side: Side,
        price: Price,
        reason: ReasonCode,
        detail: impl Into<String>,
    ) {
        Metrics::order_outcome(symbol.as_str(), reason.as_str());
        self.events.record(
            EventDraft::new(
                symbol.clone(),
                side,
                EventType::OrderFailed,
                reason,
                self.clock.now_ms(),
            )
            .with_price(price)
            .with_detail(detail),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::{ManualClock, OrderStatus};
    use sentinel_exchange::MockExchange;
    use sentinel_persistence::{EventFilter, EventLog};

    fn setup() -> (OrderPlacer, Arc<MockExchange>, Arc<OrderStore>, Arc<EventLog>) {
        let clock = Arc::new(ManualClock::new(5_000));
        let exchange = Arc::new(MockExchange::with_first_order_id(42));
        let store = Arc::new(OrderStore::new(clock.clone()));
        let events = Arc::new(EventLog::new());
        let placer = OrderPlacer::new(exchange.clone(), store.clone(), events.clone(), clock);
        (placer, exchange, store, events)
    }

    #[tokio::test]
    async fn test_place_records_created_with_ack_status() {
        let (placer, _, store, events) = setup();
        let symbol = Symbol::from("BTCUSDT");

        let order = placer
            .place(&symbol, Side::Buy, Size::new(dec!(10)), Price::new(dec!(10)))
            .await
            .unwrap();

        assert_eq!(order.order_id, Some(OrderId::from(42u64)));
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.executed_qty, None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_order_time(&symbol), Some(5_000));

        let created = events.query(&EventFilter::new().event_type(EventType::OrderCreated));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].order_id, Some(OrderId::from(42u64)));
    }

    #[tokio::test]
    async fn test_place_failure_records_raw_error() {
        let (placer, exchange, store, events) = setup();
        exchange.queue_place_result(Err(AdapterError::Terminal(
            "insufficient balance".to_string(),
        )));

        let result = placer
            .place(
                &Symbol::from("BTCUSDT"),
                Side::Buy,
                Size::new(dec!(1)),
                Price::new(dec!(10)),
            )
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());
        assert_eq!(store.last_order_time(&Symbol::from("BTCUSDT")), None);

        let failed = events.query(&EventFilter::new().event_type(EventType::OrderFailed));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reason_code, ReasonCode::AdapterTerminal);
        assert!(failed[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("insufficient balance"));
    }
}
