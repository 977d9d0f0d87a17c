//! Order store.
//!
//! Orders are keyed by local surrogate ID with an exchange order-ID index.
//! Each order sits behind its own mutex; the fill poller and the reconciler
//! change status only through [`OrderStore::apply_truth`], so their writes
//! never interleave.
//!
//! The store also owns the two per-symbol guards used by order creation:
//! - a TTL lock held from trade-gate EXEC through protection
//! - the cooldown ledger (time of the last order per symbol)

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use sentinel_core::{
    DynClock, LocalOrderId, Order, OrderId, OrderRole, OrderStatus, Price, ProtectionState,
    Size, Symbol,
};
use sentinel_persistence::JsonLinesWriter;

/// Exchange truth about one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTruth {
    pub status: OrderStatus,
    pub executed_qty: Option<Size>,
    pub avg_price: Option<Price>,
}

/// A status or fill change applied to an order.
#[derive(Debug, Clone)]
pub struct Transition {
    pub previous: OrderStatus,
    pub order: Order,
}

impl Transition {
    pub fn is_newly_terminal(&self) -> bool {
        !self.previous.is_terminal() && self.order.status.is_terminal()
    }

    /// Newly terminal with an executed quantity: a fill, or a partial fill
    /// closed by cancel, reject or expiry.
    pub fn opens_position(&self) -> bool {
        self.is_newly_terminal() && self.order.holds_position()
    }
}

/// Read-only query over orders. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub symbol: Option<Symbol>,
    pub role: Option<OrderRole>,
    pub status: Option<OrderStatus>,
    /// Created at or after (Unix ms).
    pub since_ms: Option<u64>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.symbol.as_ref().map_or(true, |s| *s == order.symbol)
            && self.role.map_or(true, |r| r == order.role)
            && self.status.map_or(true, |s| s == order.status)
            && self.since_ms.map_or(true, |t| order.created_at >= t)
    }
}

#[derive(Debug, Clone, Copy)]
struct SymbolLock {
    token: u64,
    expires_at: u64,
}

#[derive(Debug, Clone)]
struct LastOrder {
    at_ms: u64,
    local_id: LocalOrderId,
}

/// Held while an order is being created for a symbol. Releases on drop.
pub struct SymbolLockGuard {
    locks: Arc<DashMap<Symbol, SymbolLock>>,
    symbol: Symbol,
    token: u64,
}

impl Drop for SymbolLockGuard {
    fn drop(&mut self) {
        // Only release our own lock; it may have expired and been re-taken
        self.locks
            .remove_if(&self.symbol, |_, lock| lock.token == self.token);
    }
}

pub struct OrderStore {
    orders: DashMap<LocalOrderId, Arc<Mutex<Order>>>,
    by_order_id: DashMap<OrderId, LocalOrderId>,
    symbol_locks: Arc<DashMap<Symbol, SymbolLock>>,
    next_lock_token: AtomicU64,
    last_order: DashMap<Symbol, LastOrder>,
    journal: Option<Mutex<JsonLinesWriter<Order>>>,
    clock: DynClock,
}

impl OrderStore {
    pub fn new(clock: DynClock) -> Self {
        Self {
            orders: DashMap::new(),
            by_order_id: DashMap::new(),
            symbol_locks: Arc::new(DashMap::new()),
            next_lock_token: AtomicU64::new(1),
            last_order: DashMap::new(),
            journal: None,
            clock,
        }
    }

    /// Store that journals every insert and transition to `orders_<date>.jsonl`.
    pub fn with_journal(clock: DynClock, data_dir: &str, buffer_size: usize) -> Self {
        let mut store = Self::new(clock);
        store.journal = Some(Mutex::new(JsonLinesWriter::new(
            data_dir,
            "orders",
            buffer_size,
        )));
        store
    }

    fn journal(&self, order: &Order) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.lock().add_record(order.clone()) {
                warn!(?e, order_id = %order.display_id(), "Failed to journal order");
            }
        }
    }

    pub fn flush(&self) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.lock().flush() {
                warn!(?e, "Failed to flush order journal");
            }
        }
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    pub fn insert(&self, order: Order) {
        if let Some(order_id) = &order.order_id {
            self.by_order_id
                .insert(order_id.clone(), order.local_id.clone());
        }
        self.journal(&order);
        self.orders
            .insert(order.local_id.clone(), Arc::new(Mutex::new(order)));
    }

    fn handle(&self, local_id: &LocalOrderId) -> Option<Arc<Mutex<Order>>> {
        self.orders.get(local_id).map(|entry| entry.value().clone())
    }

    fn handles(&self) -> Vec<Arc<Mutex<Order>>> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get(&self, local_id: &LocalOrderId) -> Option<Order> {
        self.handle(local_id).map(|h| h.lock().clone())
    }

    pub fn local_id_of(&self, order_id: &OrderId) -> Option<LocalOrderId> {
        self.by_order_id.get(order_id).map(|e| e.value().clone())
    }

    pub fn find_by_order_id(&self, order_id: &OrderId) -> Option<Order> {
        self.local_id_of(order_id).and_then(|id| self.get(&id))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Apply exchange truth under the order's lock.
    ///
    /// Terminal statuses are sticky. Returns the transition if anything
    /// changed.
    pub fn apply_truth(&self, local_id: &LocalOrderId, truth: &OrderTruth) -> Option<Transition> {
        let handle = self.handle(local_id)?;
        let mut order = handle.lock();

        if order.status.is_terminal() {
            return None;
        }

        let executed_qty = truth.executed_qty.or(order.executed_qty);
        let avg_price = truth.avg_price.or(order.avg_fill_price);
        if order.status == truth.status
            && order.executed_qty == executed_qty
            && order.avg_fill_price == avg_price
        {
            return None;
        }

        let previous = order.status;
        order.status = truth.status;
        order.executed_qty = executed_qty;
        order.avg_fill_price = avg_price;
        order.updated_at = self.clock.now_ms();

        debug!(
            order_id = %order.display_id(),
            from = %previous,
            to = %order.status,
            executed_qty = ?order.executed_qty,
            "Order status synced"
        );

        let transition = Transition {
            previous,
            order: order.clone(),
        };
        drop(order);
        self.journal(&transition.order);
        Some(transition)
    }

    /// Claim a primary holding a position for protection.
    ///
    /// Succeeds at most once per order: the state moves UNPROTECTED -> PENDING
    /// under the order's lock.
    pub fn try_claim_protection(&self, local_id: &LocalOrderId) -> Option<Order> {
        let handle = self.handle(local_id)?;
        let mut order = handle.lock();

        if !order.is_primary()
            || !order.holds_position()
            || order.protection != ProtectionState::Unprotected
        {
            return None;
        }

        order.protection = ProtectionState::Pending;
        order.updated_at = self.clock.now_ms();
        Some(order.clone())
    }

    pub fn set_protection(&self, local_id: &LocalOrderId, state: ProtectionState) {
        let Some(handle) = self.handle(local_id) else {
            return;
        };
        let snapshot = {
            let mut order = handle.lock();
            order.protection = state;
            order.updated_at = self.clock.now_ms();
            order.clone()
        };
        self.journal(&snapshot);
    }

    /// Non-terminal orders, oldest first, at most `limit`.
    pub fn non_terminal(&self, limit: usize) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .handles()
            .iter()
            .map(|h| h.lock().clone())
            .filter(|o| !o.is_terminal())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders.truncate(limit);
        orders
    }

    /// Primaries holding a position that were never claimed for protection.
    pub fn unprotected_positions(&self) -> Vec<Order> {
        self.query(&OrderFilter {
            role: Some(OrderRole::Primary),
            ..OrderFilter::default()
        })
        .into_iter()
        .filter(|o| o.holds_position() && o.protection == ProtectionState::Unprotected)
        .collect()
    }

    /// Protection legs placed for `parent`.
    pub fn children_of(&self, parent: &OrderId) -> Vec<Order> {
        self.handles()
            .iter()
            .map(|h| h.lock().clone())
            .filter(|o| o.parent_order_id.as_ref() == Some(parent))
            .collect()
    }

    /// Positions occupying a slot on `symbol`.
    ///
    /// Counts non-terminal primaries and primaries holding a position that is
    /// not yet protected or whose protection still has a live leg.
    pub fn open_count(&self, symbol: &Symbol) -> usize {
        let orders = self.query(&OrderFilter {
            symbol: Some(symbol.clone()),
            ..OrderFilter::default()
        });

        let live_parents: HashSet<&OrderId> = orders
            .iter()
            .filter(|o| o.role.is_protection() && !o.is_terminal())
            .filter_map(|o| o.parent_order_id.as_ref())
            .collect();

        orders
            .iter()
            .filter(|o| o.is_primary())
            .filter(|o| {
                if !o.is_terminal() {
                    return true;
                }
                o.holds_position()
                    && (matches!(
                        o.protection,
                        ProtectionState::Unprotected | ProtectionState::Pending
                    ) || o
                        .order_id
                        .as_ref()
                        .map_or(false, |id| live_parents.contains(id)))
            })
            .count()
    }

    pub fn query(&self, filter: &OrderFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .handles()
            .iter()
            .map(|h| h.lock().clone())
            .filter(|o| filter.matches(o))
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    // ------------------------------------------------------------------
    // Symbol lock
    // ------------------------------------------------------------------

    /// Take the order-creation lock for `symbol`, or None if it is held and
    /// not yet expired.
    pub fn try_lock_symbol(&self, symbol: &Symbol, ttl_ms: u64) -> Option<SymbolLockGuard> {
        let now = self.clock.now_ms();
        let token = self.next_lock_token.fetch_add(1, Ordering::Relaxed);
        let lock = SymbolLock {
            token,
            expires_at: now + ttl_ms,
        };

        match self.symbol_locks.entry(symbol.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return None;
                }
                warn!(symbol = %symbol, "Expired order lock taken over");
                entry.insert(lock);
            }
            Entry::Vacant(entry) => {
                entry.insert(lock);
            }
        }

        Some(SymbolLockGuard {
            locks: self.symbol_locks.clone(),
            symbol: symbol.clone(),
            token,
        })
    }

    // ------------------------------------------------------------------
    // Cooldown ledger
    // ------------------------------------------------------------------

    pub fn record_order_time(&self, symbol: &Symbol, local_id: &LocalOrderId, at_ms: u64) {
        self.last_order.insert(
            symbol.clone(),
            LastOrder {
                at_ms,
                local_id: local_id.clone(),
            },
        );
    }

    pub fn last_order_time(&self, symbol: &Symbol) -> Option<u64> {
        self.last_order.get(symbol).map(|e| e.at_ms)
    }

    /// Drop the cooldown entry if it belongs to `local_id`.
    pub fn release_cooldown(&self, symbol: &Symbol, local_id: &LocalOrderId) -> bool {
        self.last_order
            .remove_if(symbol, |_, last| last.local_id == *local_id)
            .is_some()
    }
}
