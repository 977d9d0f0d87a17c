//! Exchange-truth resolution shared by the fill poller and the reconciler.
//!
//! Resolution order for one order:
//! 1. open orders (caller-supplied; queried once per symbol)
//! 2. order history
//! 3. trade history
//!
//! Absence from open orders alone never resolves anything.

use sentinel_core::{
    EventDraft, EventSink, EventType, Order, OrderId, OrderRole, OrderStatus, ReasonCode,
};
use sentinel_exchange::{AdapterResult, ExchangeAdapter, ExchangeOrder, Fill};
use tracing::{debug, info};

use crate::store::{OrderStore, OrderTruth, Transition};

impl From<&ExchangeOrder> for OrderTruth {
    fn from(o: &ExchangeOrder) -> Self {
        Self {
            status: o.status,
            executed_qty: (!o.executed_qty.is_zero()).then_some(o.executed_qty),
            avg_price: o.avg_price,
        }
    }
}

impl From<&Fill> for OrderTruth {
    fn from(f: &Fill) -> Self {
        Self {
            status: OrderStatus::Filled,
            executed_qty: Some(f.executed_qty),
            avg_price: Some(f.avg_price),
        }
    }
}

/// Find `order_id` in an open-orders snapshot.
pub fn find_open<'a>(open: &'a [ExchangeOrder], order_id: &OrderId) -> Option<&'a ExchangeOrder> {
    open.iter().find(|o| o.order_id == *order_id)
}

/// Resolve an order that is absent from open orders.
///
/// Ok(None) means neither history nor trades can explain it yet; the caller
/// must leave the order untouched.
pub async fn resolve_absent(
    exchange: &dyn ExchangeAdapter,
    order: &Order,
    order_id: &OrderId,
) -> AdapterResult<Option<OrderTruth>> {
    if let Some(history) = exchange.get_order_history(&order.symbol, order_id).await? {
        let mut truth = OrderTruth::from(&history);

        // A FILLED record without quantity or price: complete it from trades
        let incomplete_fill = truth.status == OrderStatus::Filled
            && (truth.executed_qty.is_none() || truth.avg_price.is_none());
        if !incomplete_fill {
            return Ok(Some(truth));
        }

        return match exchange.get_trade_history(&order.symbol, order_id).await? {
            Some(fill) => {
                truth.executed_qty = truth.executed_qty.or(Some(fill.executed_qty));
                truth.avg_price = truth.avg_price.or(Some(fill.avg_price));
                Ok(Some(truth))
            }
            None if truth.executed_qty.is_some() => Ok(Some(truth)),
            None => {
                debug!(order_id = %order_id, "History reports FILLED without quantity");
                Ok(None)
            }
        };
    }

    match exchange.get_trade_history(&order.symbol, order_id).await? {
        // Trades alone prove a fill only once they cover the requested size
        Some(fill) if fill.executed_qty >= order.requested_qty => Ok(Some(OrderTruth::from(&fill))),
        Some(fill) => {
            debug!(
                order_id = %order_id,
                traded = %fill.executed_qty,
                requested = %order.requested_qty,
                "Partial trades without history, unresolved"
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Record the events a transition implies.
///
/// FILLED records ORDER_FILLED. CANCELLED / REJECTED / EXPIRED record
/// ORDER_CANCELLED; a primary that executed nothing also releases its cooldown
/// entry. Both events are idempotent, so the poller and the reconciler may
/// both call this.
pub fn record_transition(
    store: &OrderStore,
    events: &dyn EventSink,
    transition: &Transition,
    now_ms: u64,
) {
    if !transition.is_newly_terminal() {
        return;
    }
    let order = &transition.order;

    let (event_type, reason) = match order.status {
        OrderStatus::Filled => (EventType::OrderFilled, ReasonCode::Filled),
        OrderStatus::Cancelled => (EventType::OrderCancelled, ReasonCode::Cancelled),
        OrderStatus::Rejected => (EventType::OrderCancelled, ReasonCode::Rejected),
        OrderStatus::Expired => (EventType::OrderCancelled, ReasonCode::Expired),
        _ => return,
    };

    let mut draft = EventDraft::new(order.symbol.clone(), order.side, event_type, reason, now_ms)
        .with_order_id(order.order_id.clone());
    if let Some(price) = order.avg_fill_price {
        draft = draft.with_price(price);
    }
    if let Some(parent) = &order.parent_order_id {
        draft = draft.with_linked(vec![parent.clone()]);
    }
    events.record(draft);

    if order.role != OrderRole::Primary || !order.status.is_closed_unfilled() {
        return;
    }
    if order.closed_without_fill() {
        let released = store.release_cooldown(&order.symbol, &order.local_id);
        info!(
            order_id = %order.display_id(),
            status = %order.status,
            cooldown_released = released,
            "Order closed without fill"
        );
    } else {
        // Partial execution is a live position: cooldown and slot stay held
        info!(
            order_id = %order.display_id(),
            status = %order.status,
            executed_qty = ?order.executed_qty,
            "Order closed after partial fill"
        );
    }
}
