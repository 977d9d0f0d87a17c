//! Trade gate: may this decision become an order?
//!
//! Runs independently of the signal gate: an order may execute while its
//! alert is throttled, and an alert may fire while the order is blocked.
//!
//! Checks, first failure wins:
//! 1. decision targets the requested side
//! 2. trading enabled for the symbol
//! 3. trade amount > 0
//! 4. open orders on the symbol below the cap
//! 5. order cooldown elapsed
//! 6. portfolio exposure within `portfolio_risk_multiplier * trade_amount`
//! 7. no required indicator is Unknown

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use sentinel_core::{
    Decision, DynClock, EventDraft, EventSink, EventType, Indicator, Price, ReasonCode, Side,
    SignalReasons, Symbol,
};
use sentinel_telemetry::Metrics;

/// Trade gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeGateConfig {
    #[serde(default = "default_max_open_orders_per_symbol")]
    pub max_open_orders_per_symbol: usize,
    #[serde(default = "default_order_cooldown_seconds")]
    pub order_cooldown_seconds: u64,
    /// Existing exposure in a symbol may not exceed this multiple of the
    /// trade amount.
    #[serde(default = "default_portfolio_risk_multiplier")]
    pub portfolio_risk_multiplier: Decimal,
    /// TTL of the per-symbol order creation lock.
    #[serde(default = "default_symbol_lock_ttl_ms")]
    pub symbol_lock_ttl_ms: u64,
}

fn default_max_open_orders_per_symbol() -> usize {
    1
}

fn default_order_cooldown_seconds() -> u64 {
    300
}

fn default_portfolio_risk_multiplier() -> Decimal {
    Decimal::from(3)
}

fn default_symbol_lock_ttl_ms() -> u64 {
    10_000
}

impl Default for TradeGateConfig {
    fn default() -> Self {
        Self {
            max_open_orders_per_symbol: default_max_open_orders_per_symbol(),
            order_cooldown_seconds: default_order_cooldown_seconds(),
            portfolio_risk_multiplier: default_portfolio_risk_multiplier(),
            symbol_lock_ttl_ms: default_symbol_lock_ttl_ms(),
        }
    }
}

/// Everything the trade gate needs; gathered by the caller.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub decision: Decision,
    /// Decision price, recorded on the event.
    pub price: Price,
    pub trade_enabled: bool,
    /// Quote amount per order.
    pub trade_amount: Decimal,
    pub open_count: usize,
    /// Unix ms of the last order placed on this symbol.
    pub last_order_time_ms: Option<u64>,
    /// Current exposure in this symbol (quote).
    pub portfolio_value: Decimal,
    pub reasons: SignalReasons,
    pub required_indicators: Vec<Indicator>,
}

/// Why an order was not placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeSkipReason {
    NoSignal,
    DisabledTrade,
    InvalidTradeAmount,
    MaxPositions { open: usize, max: usize },
    Cooldown { remaining_ms: u64 },
    PortfolioRisk { value: Decimal, limit: Decimal },
    MissingIndicator(Vec<Indicator>),
    /// Another placement for the symbol holds the order lock.
    InFlight,
}

impl TradeSkipReason {
    pub fn code(&self) -> ReasonCode {
        match self {
            Self::NoSignal => ReasonCode::SkipNoSignal,
            Self::DisabledTrade => ReasonCode::SkipDisabledTrade,
            Self::InvalidTradeAmount => ReasonCode::SkipInvalidTradeAmount,
            Self::MaxPositions { .. } => ReasonCode::OrderBlockedMaxPositions,
            Self::Cooldown { .. } => ReasonCode::OrderBlockedCooldown,
            Self::PortfolioRisk { .. } => ReasonCode::OrderBlockedPortfolioRisk,
            Self::MissingIndicator(_) => ReasonCode::OrderBlockedMissingIndicator,
            Self::InFlight => ReasonCode::OrderBlockedInFlight,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::MaxPositions { open, max } => Some(format!("open {open} >= max {max}")),
            Self::Cooldown { remaining_ms } => Some(format!("{remaining_ms}ms remaining")),
            Self::PortfolioRisk { value, limit } => Some(format!("value {value} > limit {limit}")),
            Self::MissingIndicator(missing) => Some(
                missing
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        }
    }
}

/// Trade gate outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeDecision {
    Exec,
    Skip(TradeSkipReason),
}

impl TradeDecision {
    pub fn is_exec(&self) -> bool {
        matches!(self, Self::Exec)
    }
}

pub struct TradeGate {
    config: TradeGateConfig,
    events: Arc<dyn EventSink>,
    clock: DynClock,
}

impl TradeGate {
    pub fn new(config: TradeGateConfig, events: Arc<dyn EventSink>, clock: DynClock) -> Self {
        Self {
            config,
            events,
            clock,
        }
    }

    pub fn config(&self) -> &TradeGateConfig {
        &self.config
    }

    /// Pure check, no event recorded.
    pub fn check(&self, req: &TradeRequest, now_ms: u64) -> TradeDecision {
        use TradeSkipReason::*;

        if !req.decision.matches(req.side) {
            return TradeDecision::Skip(NoSignal);
        }
        if !req.trade_enabled {
            return TradeDecision::Skip(DisabledTrade);
        }
        if req.trade_amount <= Decimal::ZERO {
            return TradeDecision::Skip(InvalidTradeAmount);
        }
        if req.open_count >= self.config.max_open_orders_per_symbol {
            return TradeDecision::Skip(MaxPositions {
                open: req.open_count,
                max: self.config.max_open_orders_per_symbol,
            });
        }
        if let Some(last) = req.last_order_time_ms {
            let cooldown_ms = self.config.order_cooldown_seconds * 1000;
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < cooldown_ms {
                return TradeDecision::Skip(Cooldown {
                    remaining_ms: cooldown_ms - elapsed,
                });
            }
        }
        let limit = self.config.portfolio_risk_multiplier * req.trade_amount;
        if req.portfolio_value > limit {
            return TradeDecision::Skip(PortfolioRisk {
                value: req.portfolio_value,
                limit,
            });
        }
        let missing = req.reasons.missing(&req.required_indicators);
        if !missing.is_empty() {
            return TradeDecision::Skip(MissingIndicator(missing));
        }

        TradeDecision::Exec
    }

    /// Pure check against the current time.
    pub fn check_now(&self, req: &TradeRequest) -> TradeDecision {
        self.check(req, self.clock.now_ms())
    }

    /// Check and record. Every skip produces one TRADE_BLOCKED event.
    pub fn evaluate(&self, req: &TradeRequest) -> TradeDecision {
        let decision = self.check(req, self.clock.now_ms());
        match &decision {
            TradeDecision::Exec => {
                debug!(symbol = %req.symbol, side = %req.side, "Trade gate passed");
                Metrics::trade_decision(req.symbol.as_str(), req.side.as_str(), "EXEC");
            }
            TradeDecision::Skip(reason) => self.record_skip(req, reason),
        }
        decision
    }

    /// Record a TRADE_BLOCKED event for `reason`.
    pub fn record_skip(&self, req: &TradeRequest, reason: &TradeSkipReason) {
        let code = reason.code();
        trace!(symbol = %req.symbol, side = %req.side, reason = ?reason, "Trade blocked");
        Metrics::trade_decision(req.symbol.as_str(), req.side.as_str(), code.as_str());

        let mut draft = EventDraft::new(
            req.symbol.clone(),
            req.side,
            EventType::TradeBlocked,
            code,
            self.clock.now_ms(),
        )
        .with_price(req.price);
        if let Some(detail) = reason.detail() {
            draft = draft.with_detail(detail);
        }
        self.events.record(draft);
    }
}
