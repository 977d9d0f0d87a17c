//! Scripted exchange for tests.
//!
//! Each placed order can be given a script of `MockStep`s. Every call to
//! `get_open_orders(symbol)` advances each order of that symbol by one step
//! before answering, so a script reads as "what the N-th poll sees".
//! Orders without a script keep their acknowledged status.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use rust_decimal::Decimal;

use sentinel_core::{BoxFuture, OrderId, OrderStatus, Price, Size, Symbol};

use crate::adapter::{ExchangeAdapter, ExchangeOrder, Fill, OrderAck, OrderRequest};
use crate::error::{AdapterError, AdapterResult};

/// One scripted state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Still open with this status and executed quantity.
    Open { status: OrderStatus, executed_qty: Size },
    /// Filled: leaves the open book, history reports FILLED.
    Filled { qty: Size, avg_price: Price },
    /// Closed without a fill (CANCELLED / REJECTED / EXPIRED): history reports it.
    Closed(OrderStatus),
    /// Leaves the open book with no history record, trades only.
    TradesOnly { qty: Size, avg_price: Price },
    /// Leaves the open book and appears nowhere.
    Vanished,
}

impl MockStep {
    pub fn active() -> Self {
        Self::Open {
            status: OrderStatus::Active,
            executed_qty: Size::ZERO,
        }
    }

    pub fn partial(executed_qty: Size) -> Self {
        Self::Open {
            status: OrderStatus::PartiallyFilled,
            executed_qty,
        }
    }

    pub fn filled(qty: Decimal, avg_price: Decimal) -> Self {
        Self::Filled {
            qty: Size::new(qty),
            avg_price: Price::new(avg_price),
        }
    }
}

struct MockOrder {
    order: ExchangeOrder,
    open: bool,
    in_history: bool,
    fill: Option<Fill>,
    script: VecDeque<MockStep>,
}

impl MockOrder {
    fn apply(&mut self, step: MockStep) {
        match step {
            MockStep::Open {
                status,
                executed_qty,
            } => {
                self.order.status = status;
                self.order.executed_qty = executed_qty;
            }
            MockStep::Filled { qty, avg_price } => {
                self.order.status = OrderStatus::Filled;
                self.order.executed_qty = qty;
                self.order.avg_price = Some(avg_price);
                self.open = false;
                self.in_history = true;
                self.fill = Some(Fill {
                    order_id: self.order.order_id.clone(),
                    executed_qty: qty,
                    avg_price,
                });
            }
            MockStep::Closed(status) => {
                self.order.status = status;
                self.open = false;
                self.in_history = true;
            }
            MockStep::TradesOnly { qty, avg_price } => {
                self.open = false;
                self.in_history = false;
                self.fill = Some(Fill {
                    order_id: self.order.order_id.clone(),
                    executed_qty: qty,
                    avg_price,
                });
            }
            MockStep::Vanished => {
                self.open = false;
                self.in_history = false;
            }
        }
    }
}

struct MockState {
    next_id: u64,
    place_results: VecDeque<AdapterResult<OrderStatus>>,
    scripts: VecDeque<Vec<MockStep>>,
    orders: HashMap<OrderId, MockOrder>,
    /// Placement order, for deterministic iteration.
    sequence: Vec<OrderId>,
    placed: Vec<OrderRequest>,
    cancelled: Vec<OrderId>,
    open_errors: HashMap<Symbol, AdapterError>,
    history_error: Option<AdapterError>,
    open_calls: usize,
    history_calls: usize,
    trade_calls: usize,
}

/// Scripted, call-counting exchange adapter.
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self::with_first_order_id(1)
    }

    /// Exchange IDs are assigned sequentially from `first_id`.
    pub fn with_first_order_id(first_id: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: first_id,
                place_results: VecDeque::new(),
                scripts: VecDeque::new(),
                orders: HashMap::new(),
                sequence: Vec::new(),
                placed: Vec::new(),
                cancelled: Vec::new(),
                open_errors: HashMap::new(),
                history_error: None,
                open_calls: 0,
                history_calls: 0,
                trade_calls: 0,
            }),
        }
    }

    /// Queue the outcome of the next `place_order` (default: ACTIVE ack).
    pub fn queue_place_result(&self, result: AdapterResult<OrderStatus>) {
        self.state.lock().place_results.push_back(result);
    }

    /// Queue a script for the next placed order without one.
    pub fn queue_script(&self, steps: Vec<MockStep>) {
        self.state.lock().scripts.push_back(steps);
    }

    /// Append steps to an existing order's script.
    pub fn push_steps(&self, order_id: &OrderId, steps: Vec<MockStep>) {
        if let Some(order) = self.state.lock().orders.get_mut(order_id) {
            order.script.extend(steps);
        }
    }

    /// Make `get_open_orders(symbol)` fail until cleared with `None`.
    pub fn set_open_orders_error(&self, symbol: &Symbol, error: Option<AdapterError>) {
        let mut state = self.state.lock();
        match error {
            Some(e) => state.open_errors.insert(symbol.clone(), e),
            None => state.open_errors.remove(symbol),
        };
    }

    /// Make `get_order_history` fail until cleared with `None`.
    pub fn set_history_error(&self, error: Option<AdapterError>) {
        self.state.lock().history_error = error;
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.state.lock().placed.clone()
    }

    pub fn cancelled(&self) -> Vec<OrderId> {
        self.state.lock().cancelled.clone()
    }

    pub fn open_orders_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().history_calls
    }

    pub fn trade_calls(&self) -> usize {
        self.state.lock().trade_calls
    }

    /// Current exchange view of an order.
    pub fn order(&self, order_id: &OrderId) -> Option<ExchangeOrder> {
        self.state
            .lock()
            .orders
            .get(order_id)
            .map(|o| o.order.clone())
    }

    fn place_sync(&self, request: OrderRequest) -> AdapterResult<OrderAck> {
        let mut state = self.state.lock();
        state.placed.push(request.clone());

        let status = state
            .place_results
            .pop_front()
            .unwrap_or(Ok(OrderStatus::Active))?;

        let order_id = OrderId::from(state.next_id);
        state.next_id += 1;

        let script: VecDeque<MockStep> = state.scripts.pop_front().unwrap_or_default().into();
        let order = MockOrder {
            order: ExchangeOrder {
                order_id: order_id.clone(),
                symbol: request.symbol,
                side: request.side,
                order_type: request.order_type,
                status,
                orig_qty: request.qty,
                executed_qty: Size::ZERO,
                price: request.price,
                avg_price: None,
            },
            open: !status.is_terminal(),
            in_history: status.is_terminal(),
            fill: None,
            script,
        };
        state.orders.insert(order_id.clone(), order);
        state.sequence.push(order_id.clone());

        Ok(OrderAck { order_id, status })
    }

    fn open_orders_sync(&self, symbol: &Symbol) -> AdapterResult<Vec<ExchangeOrder>> {
        let mut state = self.state.lock();
        state.open_calls += 1;
        if let Some(e) = state.open_errors.get(symbol) {
            return Err(e.clone());
        }

        let MockState {
            sequence, orders, ..
        } = &mut *state;
        let mut open = Vec::new();
        for id in sequence.iter() {
            let Some(order) = orders.get_mut(id) else {
                continue;
            };
            if order.order.symbol != *symbol || !order.open {
                continue;
            }
            if let Some(step) = order.script.pop_front() {
                order.apply(step);
            }
            if order.open {
                open.push(order.order.clone());
            }
        }
        Ok(open)
    }

    fn history_sync(&self, order_id: &OrderId) -> AdapterResult<Option<ExchangeOrder>> {
        let mut state = self.state.lock();
        state.history_calls += 1;
        if let Some(e) = &state.history_error {
            return Err(e.clone());
        }
        Ok(state
            .orders
            .get(order_id)
            .filter(|o| o.in_history)
            .map(|o| o.order.clone()))
    }

    fn trades_sync(&self, order_id: &OrderId) -> AdapterResult<Option<Fill>> {
        let mut state = self.state.lock();
        state.trade_calls += 1;
        Ok(state.orders.get(order_id).and_then(|o| o.fill.clone()))
    }

    fn cancel_sync(&self, order_id: &OrderId) -> AdapterResult<()> {
        let mut state = self.state.lock();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AdapterError::Terminal(format!("unknown order {order_id}")))?;
        if !order.open {
            return Err(AdapterError::Terminal(format!(
                "order {order_id} is not open"
            )));
        }
        order.script.clear();
        order.apply(MockStep::Closed(OrderStatus::Cancelled));
        state.cancelled.push(order_id.clone());
        Ok(())
    }
}

impl ExchangeAdapter for MockExchange {
    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, AdapterResult<OrderAck>> {
        Box::pin(async move { self.place_sync(request) })
    }

    fn get_open_orders<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, AdapterResult<Vec<ExchangeOrder>>> {
        Box::pin(async move { self.open_orders_sync(symbol) })
    }

    fn get_order_history<'a>(
        &'a self,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<Option<ExchangeOrder>>> {
        Box::pin(async move { self.history_sync(order_id) })
    }

    fn get_trade_history<'a>(
        &'a self,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<Option<Fill>>> {
        Box::pin(async move { self.trades_sync(order_id) })
    }

    fn cancel_order<'a>(
        &'a self,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, AdapterResult<()>> {
        Box::pin(async move { self.cancel_sync(order_id) })
    }
}
