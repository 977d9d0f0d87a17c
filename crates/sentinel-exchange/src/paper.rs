//! Paper trading exchange.
//!
//! Entry orders fill at their limit price once they have been seen by
//! `fill_after_polls` open-order queries. Reduce-only orders (protection legs)
//! rest until cancelled; there is no market data to trigger them.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use sentinel_core::{BoxFuture, OrderId, OrderStatus, Size, Symbol};

use crate::adapter::{ExchangeAdapter, ExchangeOrder, Fill, OrderAck, OrderRequest};
use crate::error::{AdapterError, AdapterResult};

struct PaperOrder {
    order: ExchangeOrder,
    reduce_only: bool,
    polls_left: u32,
}

#[derive(Default)]
struct PaperBook {
    next_id: u64,
    orders: HashMap<OrderId, PaperOrder>,
}

pub struct PaperExchange {
    fill_after_polls: u32,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(fill_after_polls: u32) -> Self {
        Self {
            fill_after_polls: fill_after_polls.max(1),
            book: Mutex::new(PaperBook {
                next_id: 1,
                ..PaperBook::default()
            }),
        }
    }

    fn place_sync(&self, request: OrderRequest) -> AdapterResult<OrderAck> {
        if !request.qty.is_positive() || !request.price.is_positive() {
            return Err(AdapterError::Terminal(format!(
                "invalid order: qty={} price={}",
                request.qty, request.price
            )));
        }

        let mut book = self.book.lock();
        let order_id = OrderId::from(book.next_id);
        book.next_id += 1;

        info!(
            order_id = %order_id,
            symbol = %request.symbol,
            side = %request.side,
            qty = %request.qty,
            price = %request.price,
            order_type = %request.order_type,
            "Paper order accepted"
        );

        book.orders.insert(
            order_id.clone(),
            PaperOrder {
                order: ExchangeOrder {
                    order_id: order_id.clone(),
                    symbol: request.symbol,
                    side: request.side,
                    order_type: request.order_type,
                    status: OrderStatus::New,
                    orig_qty: request.qty,
                    executed_qty: Size::ZERO,
                    price: request.price,
                    avg_price: None,
                },
                reduce_only: request.reduce_only,
                polls_left: self.fill_after_polls,
            },
        );

        Ok(OrderAck {
            order_id,
            status: OrderStatus::New,
        })
    }

    fn open_orders_sync(&self, symbol: &Symbol) -> Vec<ExchangeOrder> {
        let mut book = self.book.lock();
        let mut open = Vec::new();
        for paper in book.orders.values_mut() {
            let order = &mut paper.order;
            if order.symbol != *symbol || order.status.is_terminal() {
                continue;
            }
            if !paper.reduce_only {
                paper.polls_left = paper.polls_left.saturating_sub(1);
                if paper.polls_left == 0 {
                    order.status = OrderStatus::Filled;
                    order.executed_qty = order.orig_qty;
                    order.avg_price = Some(order.price);
                    debug!(order_id = %order.order_id, "Paper order filled");
                    continue;
                }
            }
            order.status = OrderStatus::Active;
            open.push(order.clone());
        }
        open
    }

    fn history_sync(&self, order_id: &OrderId) -> Option<ExchangeOrder> {
        self.book
            .lock()
            .orders
            .get(order_id)
            .filter(|p| p.order.status.is_terminal())
            .map(|p| p.order.clone())
    }

    fn trades_sync(&self, order_id: &OrderId) -> Option<Fill> {
        let book = self.book.lock();
        let order = &book.orders.get(order_id)?.order;
        let avg_price = order.avg_price?;
        Some(Fill {
            order_id: order.order_id.clone(),
            executed_qty: order.executed_qty,
            avg_price,
        })
    }

    fn cancel_sync(&self, order_id: &OrderId) -> AdapterResult<()> {
        let mut book = self.book.lock();
        let paper = book
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AdapterError::Terminal(format!("unknown order {order_id}")))?;
        if paper.order.status.is_terminal() {
            return Err(AdapterError::Terminal(format!(
                "order {order_id} already {}",
                paper.order.status
            )));
        }
        paper.order.status = OrderStatus::Cancelled;
        info!(order_id = %order_id, "Paper order cancelled");
        Ok(())
    }
}

impl ExchangeAdapter for PaperExchange {
    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, AdapterResult<OrderAck>> {
        Box::pin(async move { self.place_sync(request) })
    }

    fn get_open_orders<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, AdapterResult<Vec<ExchangeOrder>>> {
        Box::pin(async move { Ok(self.open_orders_sync(symbol)) })
    }

    fn get_order_history<'a>(
        &'a self,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<Option<ExchangeOrder>>> {
        Box::pin(async move { Ok(self.history_sync(order_id)) })
    }

    fn get_trade_history<'a>(
        &'a self,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<Option<Fill>>> {
        Box::pin(async move { Ok(self.trades_sync(order_id)) })
    }

    fn cancel_order<'a>(
        &'a self,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<()>> {
        Box::pin(async move { self.cancel_sync(order_id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::{OrderType, Price, Side};

    fn request(reduce_only: bool) -> OrderRequest {
        OrderRequest {
            symbol: Symbol::from("ETHUSDT"),
            side: Side::Buy,
            qty: Size::new(dec!(2)),
            price: Price::new(dec!(50)),
            order_type: OrderType::Limit,
            trigger_price: None,
            reduce_only,
        }
    }

    #[tokio::test]
    async fn test_entry_fills_after_polls() {
        let exchange = PaperExchange::new(2);
        let symbol = Symbol::from("ETHUSDT");
        let ack = exchange.place_order(request(false)).await.unwrap();
        assert_eq!(ack.status, OrderStatus::New);

        assert_eq!(exchange.get_open_orders(&symbol).await.unwrap().len(), 1);
        assert!(exchange.get_open_orders(&symbol).await.unwrap().is_empty());

        let fill = exchange
            .get_trade_history(&symbol, &ack.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fill.executed_qty, Size::new(dec!(2)));
        assert_eq!(fill.avg_price, Price::new(dec!(50)));
    }

    #[tokio::test]
    async fn test_reduce_only_rests_until_cancelled() {
        let exchange = PaperExchange::new(1);
        let symbol = Symbol::from("ETHUSDT");
        let ack = exchange.place_order(request(true)).await.unwrap();

        for _ in 0..3 {
            assert_eq!(exchange.get_open_orders(&symbol).await.unwrap().len(), 1);
        }
        exchange.cancel_order(&symbol, &ack.order_id).await.unwrap();
        let history = exchange
            .get_order_history(&symbol, &ack.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_rejects_zero_qty() {
        let exchange = PaperExchange::new(1);
        let mut req = request(false);
        req.qty = Size::ZERO;
        assert!(exchange.place_order(req).await.is_err());
    }
}
