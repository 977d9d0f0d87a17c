//! Order records and identifiers.
//!
//! An `Order` is created only after the exchange acknowledges a placement and
//! then lives as history. `executed_qty` is filled in exclusively from
//! confirmed exchange truth (open orders, order history, trade history).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Price, Side, Size, Symbol};

/// Exchange-assigned order ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Local surrogate key for an order row.
///
/// Format: `sen_{timestamp_ms}_{uuid_short}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalOrderId(String);

impl LocalOrderId {
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("sen_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocalOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an order is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderRole {
    Primary,
    StopLoss,
    TakeProfit,
}

impl OrderRole {
    pub fn is_protection(&self) -> bool {
        matches!(self, Self::StopLoss | Self::TakeProfit)
    }
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "PRIMARY"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
        }
    }
}

/// Exchange order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    /// Stop order, triggers at `trigger_price`.
    StopLoss,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    New,
    Active,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Terminal without a complete fill.
    #[must_use]
    pub fn is_closed_unfilled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Rejected | Self::Expired)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Active => write!(f, "ACTIVE"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Stop-loss / take-profit coverage of a primary order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionState {
    /// Protection legs themselves carry this.
    #[default]
    NotApplicable,
    Unprotected,
    /// Claimed by the poller or the reconciler; placement in progress.
    Pending,
    Protected {
        stop_loss: OrderId,
        take_profit: OrderId,
    },
    Failed {
        reason: String,
    },
}

/// An order row, from acknowledgement to terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub local_id: LocalOrderId,
    pub order_id: Option<OrderId>,
    pub symbol: Symbol,
    pub side: Side,
    pub role: OrderRole,
    pub order_type: OrderType,
    pub requested_qty: Size,
    /// Confirmed executed quantity. None until the exchange reports one.
    pub executed_qty: Option<Size>,
    pub price: Price,
    pub trigger_price: Option<Price>,
    pub avg_fill_price: Option<Price>,
    pub status: OrderStatus,
    /// Unix ms.
    pub created_at: u64,
    /// Unix ms.
    pub updated_at: u64,
    pub parent_order_id: Option<OrderId>,
    pub protection: ProtectionState,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_primary(&self) -> bool {
        self.role == OrderRole::Primary
    }

    pub fn has_execution(&self) -> bool {
        self.executed_qty.map_or(false, |q| q.is_positive())
    }

    /// Terminal with a confirmed executed quantity, including a partial fill
    /// that was later cancelled, rejected or expired.
    pub fn holds_position(&self) -> bool {
        self.is_terminal() && self.has_execution()
    }

    /// Closed with nothing executed.
    pub fn closed_without_fill(&self) -> bool {
        self.status.is_closed_unfilled() && !self.has_execution()
    }

    /// Exchange ID, or the local ID for logging when not yet assigned.
    pub fn display_id(&self) -> String {
        match &self.order_id {
            Some(id) => id.to_string(),
            None => self.local_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_order_id_unique() {
        let id1 = LocalOrderId::new();
        let id2 = LocalOrderId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("sen_"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Active.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_closed_unfilled());
        assert!(OrderStatus::Expired.is_closed_unfilled());
        assert!(!OrderStatus::Filled.is_closed_unfilled());
    }

    #[test]
    fn test_partial_fill_then_cancel_holds_position() {
        use rust_decimal_macros::dec;

        let mut order = Order {
            local_id: LocalOrderId::new(),
            order_id: Some(OrderId::from(1u64)),
            symbol: Symbol::from("BTCUSDT"),
            side: Side::Buy,
            role: OrderRole::Primary,
            order_type: OrderType::Limit,
            requested_qty: Size::new(dec!(10)),
            executed_qty: Some(Size::new(dec!(4))),
            price: Price::new(dec!(100)),
            trigger_price: None,
            avg_fill_price: None,
            status: OrderStatus::PartiallyFilled,
            created_at: 0,
            updated_at: 0,
            parent_order_id: None,
            protection: ProtectionState::Unprotected,
        };
        assert!(!order.holds_position());

        order.status = OrderStatus::Cancelled;
        assert!(order.holds_position());
        assert!(!order.closed_without_fill());

        order.executed_qty = None;
        assert!(!order.holds_position());
        assert!(order.closed_without_fill());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FILLED\"");
    }

    #[test]
    fn test_protection_state_serde() {
        let state = ProtectionState::Protected {
            stop_loss: OrderId::from(7u64),
            take_profit: OrderId::from(8u64),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("PROTECTED"));
        let back: ProtectionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
