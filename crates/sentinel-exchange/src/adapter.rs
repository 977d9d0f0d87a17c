//! Exchange adapter trait.
//!
//! Adapter calls are safe to retry on transient errors. Preventing duplicate
//! submissions is the caller's job, not the adapter's.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use sentinel_core::{BoxFuture, OrderId, OrderStatus, OrderType, Price, Side, Size, Symbol};

use crate::error::AdapterResult;

/// Order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Size,
    /// Limit price (also the worst execution price for stop orders).
    pub price: Price,
    pub order_type: OrderType,
    /// Trigger for stop orders.
    pub trigger_price: Option<Price>,
    /// Only reduces an existing position (protection legs).
    pub reduce_only: bool,
}

/// Immediate placement response. Says nothing about fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Exchange view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub orig_qty: Size,
    pub executed_qty: Size,
    pub price: Price,
    pub avg_price: Option<Price>,
}

/// Aggregated trade-history fill of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub executed_qty: Size,
    pub avg_price: Price,
}

/// Exchange operations the engine depends on.
pub trait ExchangeAdapter: Send + Sync {
    /// Submit an order.
    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, AdapterResult<OrderAck>>;

    /// Currently open orders for `symbol`.
    fn get_open_orders<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, AdapterResult<Vec<ExchangeOrder>>>;

    /// Historical record of one order, if the exchange has it.
    fn get_order_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<Option<ExchangeOrder>>>;

    /// Trade-history fill of one order, if any trades exist.
    fn get_trade_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<Option<Fill>>>;

    /// Cancel an open order.
    fn cancel_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<()>>;
}

/// Arc wrapper for ExchangeAdapter trait objects.
pub type DynExchange = Arc<dyn ExchangeAdapter>;
