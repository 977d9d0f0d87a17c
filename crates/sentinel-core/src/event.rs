//! Lifecycle audit events.
//!
//! Every terminal outcome of a gate, placement, fill or protection attempt is
//! recorded as exactly one `LifecycleEvent`. Events are append-only; the sink
//! assigns the auto-increment ID.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{OrderId, Price, Side, Symbol};

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TradeBlocked,
    OrderCreated,
    OrderFailed,
    OrderFilled,
    OrderCancelled,
    SltpCreated,
    SltpFailed,
    AlertSent,
    AlertBlocked,
}

impl EventType {
    /// Order-scoped events are keyed by (type, order_id) and recorded at most once.
    pub fn is_order_scoped(&self) -> bool {
        matches!(
            self,
            Self::OrderCreated
                | Self::OrderFilled
                | Self::OrderCancelled
                | Self::SltpCreated
                | Self::SltpFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TradeBlocked => "TRADE_BLOCKED",
            Self::OrderCreated => "ORDER_CREATED",
            Self::OrderFailed => "ORDER_FAILED",
            Self::OrderFilled => "ORDER_FILLED",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::SltpCreated => "SLTP_CREATED",
            Self::SltpFailed => "SLTP_FAILED",
            Self::AlertSent => "ALERT_SENT",
            Self::AlertBlocked => "ALERT_BLOCKED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    // Signal gate
    FirstSignal,
    ForcedSignal,
    ThresholdsMet,
    AlertDisabled,
    NoSignal,
    ThrottledTimeGate,
    ThrottledPriceGate,

    // Trade gate
    SkipNoSignal,
    SkipDisabledTrade,
    SkipInvalidTradeAmount,
    OrderBlockedMaxPositions,
    OrderBlockedCooldown,
    OrderBlockedPortfolioRisk,
    OrderBlockedMissingIndicator,
    OrderBlockedInFlight,

    // Placement
    OrderAccepted,
    AdapterTransient,
    AdapterTerminal,
    NormalizationFailed,

    // Fill / reconciliation
    Filled,
    Cancelled,
    Rejected,
    Expired,

    // Protection
    ProtectionPlaced,
    StopLossFailed,
    TakeProfitFailed,
    ProtectionNormalizationFailed,
    ProtectionConfigMissing,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstSignal => "FIRST_SIGNAL",
            Self::ForcedSignal => "FORCED_SIGNAL",
            Self::ThresholdsMet => "THRESHOLDS_MET",
            Self::AlertDisabled => "ALERT_DISABLED",
            Self::NoSignal => "NO_SIGNAL",
            Self::ThrottledTimeGate => "THROTTLED_TIME_GATE",
            Self::ThrottledPriceGate => "THROTTLED_PRICE_GATE",
            Self::SkipNoSignal => "SKIP_NO_SIGNAL",
            Self::SkipDisabledTrade => "SKIP_DISABLED_TRADE",
            Self::SkipInvalidTradeAmount => "SKIP_INVALID_TRADE_AMOUNT",
            Self::OrderBlockedMaxPositions => "ORDER_BLOCKED_MAX_POSITIONS",
            Self::OrderBlockedCooldown => "ORDER_BLOCKED_COOLDOWN",
            Self::OrderBlockedPortfolioRisk => "ORDER_BLOCKED_PORTFOLIO_RISK",
            Self::OrderBlockedMissingIndicator => "ORDER_BLOCKED_MISSING_INDICATOR",
            Self::OrderBlockedInFlight => "ORDER_BLOCKED_IN_FLIGHT",
            Self::OrderAccepted => "ORDER_ACCEPTED",
            Self::AdapterTransient => "ADAPTER_TRANSIENT",
            Self::AdapterTerminal => "ADAPTER_TERMINAL",
            Self::NormalizationFailed => "NORMALIZATION_FAILED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::ProtectionPlaced => "PROTECTION_PLACED",
            Self::StopLossFailed => "STOP_LOSS_FAILED",
            Self::TakeProfitFailed => "TAKE_PROFIT_FAILED",
            Self::ProtectionNormalizationFailed => "PROTECTION_NORMALIZATION_FAILED",
            Self::ProtectionConfigMissing => "PROTECTION_CONFIG_MISSING",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded, immutable audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub event_type: EventType,
    pub reason_code: ReasonCode,
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_order_ids: Vec<OrderId>,
    pub price: Option<Price>,
    pub detail: Option<String>,
    /// Unix ms.
    pub timestamp_ms: u64,
}

/// Event contents before the sink assigns an ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub symbol: Symbol,
    pub side: Side,
    pub event_type: EventType,
    pub reason_code: ReasonCode,
    pub order_id: Option<OrderId>,
    pub linked_order_ids: Vec<OrderId>,
    pub price: Option<Price>,
    pub detail: Option<String>,
    pub timestamp_ms: u64,
}

impl EventDraft {
    pub fn new(
        symbol: Symbol,
        side: Side,
        event_type: EventType,
        reason_code: ReasonCode,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            symbol,
            side,
            event_type,
            reason_code,
            order_id: None,
            linked_order_ids: Vec::new(),
            price: None,
            detail: None,
            timestamp_ms,
        }
    }

    #[must_use]
    pub fn with_order_id(mut self, order_id: Option<OrderId>) -> Self {
        self.order_id = order_id;
        self
    }

    #[must_use]
    pub fn with_linked(mut self, ids: Vec<OrderId>) -> Self {
        self.linked_order_ids = ids;
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Finalize with a sink-assigned ID.
    pub fn into_event(self, id: u64) -> LifecycleEvent {
        LifecycleEvent {
            id,
            symbol: self.symbol,
            side: self.side,
            event_type: self.event_type,
            reason_code: self.reason_code,
            order_id: self.order_id,
            linked_order_ids: self.linked_order_ids,
            price: self.price,
            detail: self.detail,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Append-only destination for lifecycle events.
pub trait EventSink: Send + Sync {
    /// Record an event.
    ///
    /// Returns the assigned ID, or None if an order-scoped event with the same
    /// (type, order_id) was already recorded.
    fn record(&self, draft: EventDraft) -> Option<u64>;
}
