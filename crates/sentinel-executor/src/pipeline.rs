//! Per-symbol decision pipeline.
//!
//! signal gate -> trade gate -> symbol lock -> normalize -> place -> poll
//! -> protect. The two gates are independent: an alert emitted or throttled
//! has no influence on whether an order is placed. The symbol lock is held
//! from the trade gate's EXEC until protection is settled.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use sentinel_core::{Indicator, OrderId, OrderStatus, ReasonCode, Side, SignalDecision, Size};
use sentinel_exchange::{DynNotifier, Notification};
use sentinel_gates::{
    AlertDecision, SignalGate, SignalInput, StrategyThrottle, TradeDecision, TradeGate,
    TradeRequest, TradeSkipReason,
};

use crate::error::{ExecutorError, ExecutorResult};
use crate::fill_poller::{FillOutcome, FillPoller};
use crate::placer::OrderPlacer;
use crate::protection::{ProtectionOrchestrator, SettingsRegistry};
use crate::store::OrderStore;

/// Per-channel knobs, re-read from config every tick.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub strategy: StrategyThrottle,
    pub alert_enabled: bool,
    pub trade_enabled: bool,
    /// Quote amount per order.
    pub trade_amount: Decimal,
    pub required_indicators: Vec<Indicator>,
}

/// What happened after the trade gate said EXEC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Never reached the exchange or was refused (ORDER_FAILED recorded).
    Failed,
    Protected { order_id: OrderId },
    ProtectionFailed { order_id: OrderId },
    /// Filled, but protection is being handled elsewhere.
    ProtectionDeferred { order_id: OrderId },
    Closed { order_id: OrderId, status: OrderStatus },
    /// Fill not confirmed in time; the reconciler takes over.
    Deferred { order_id: OrderId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub alert: Option<AlertDecision>,
    pub trade: Option<TradeDecision>,
    pub order: Option<OrderOutcome>,
}

pub struct DecisionPipeline {
    signal_gate: Arc<SignalGate>,
    trade_gate: Arc<TradeGate>,
    store: Arc<OrderStore>,
    placer: Arc<OrderPlacer>,
    poller: Arc<FillPoller>,
    protection: Arc<ProtectionOrchestrator>,
    settings: Arc<SettingsRegistry>,
    notifier: DynNotifier,
}

impl DecisionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signal_gate: Arc<SignalGate>,
        trade_gate: Arc<TradeGate>,
        store: Arc<OrderStore>,
        placer: Arc<OrderPlacer>,
        poller: Arc<FillPoller>,
        protection: Arc<ProtectionOrchestrator>,
        settings: Arc<SettingsRegistry>,
        notifier: DynNotifier,
    ) -> Self {
        Self {
            signal_gate,
            trade_gate,
            store,
            placer,
            poller,
            protection,
            settings,
            notifier,
        }
    }

    /// Process one decision for one channel.
    ///
    /// With `trading` false only the signal gate runs. WAIT decisions target
    /// no channel and record nothing.
    pub async fn on_decision(
        &self,
        decision: &SignalDecision,
        portfolio_value: Decimal,
        channel: &ChannelConfig,
        trading: bool,
    ) -> ExecutorResult<PipelineOutcome> {
        let mut outcome = PipelineOutcome::default();
        let Some(side) = decision.side() else {
            debug!(symbol = %decision.symbol, "WAIT, nothing to evaluate");
            return Ok(outcome);
        };
        let symbol = &decision.symbol;

        let alert = self.signal_gate.evaluate(
            &SignalInput {
                symbol: symbol.clone(),
                side,
                decision: decision.decision,
                price: decision.price,
                alert_enabled: channel.alert_enabled,
            },
            &channel.strategy,
        );
        if alert.is_emit() {
            let message = format!("{side} signal on {symbol} @ {}", decision.price);
            if let Err(e) = self.notifier.notify(Notification::normal(message)).await {
                warn!(symbol = %symbol, error = %e, "Failed to send signal notification");
            }
        }
        outcome.alert = Some(alert);

        if !trading {
            return Ok(outcome);
        }

        let request = self.trade_request(decision, side, portfolio_value, channel);
        let trade = self.trade_gate.evaluate(&request);
        outcome.trade = Some(trade.clone());
        if !trade.is_exec() {
            return Ok(outcome);
        }

        let ttl_ms = self.trade_gate.config().symbol_lock_ttl_ms;
        let Some(_guard) = self.store.try_lock_symbol(symbol, ttl_ms) else {
            let reason = TradeSkipReason::InFlight;
            self.trade_gate.record_skip(&request, &reason);
            outcome.trade = Some(TradeDecision::Skip(reason));
            return Ok(outcome);
        };

        // Another placement may have finished between the gate and the lock
        let request = self.trade_request(decision, side, portfolio_value, channel);
        if let TradeDecision::Skip(reason) = self.trade_gate.check_now(&request) {
            self.trade_gate.record_skip(&request, &reason);
            outcome.trade = Some(TradeDecision::Skip(reason));
            return Ok(outcome);
        }

        outcome.order = Some(self.execute(decision, side, channel).await?);
        Ok(outcome)
    }

    fn trade_request(
        &self,
        decision: &SignalDecision,
        side: Side,
        portfolio_value: Decimal,
        channel: &ChannelConfig,
    ) -> TradeRequest {
        TradeRequest {
            symbol: decision.symbol.clone(),
            side,
            decision: decision.decision,
            price: decision.price,
            trade_enabled: channel.trade_enabled,
            trade_amount: channel.trade_amount,
            open_count: self.store.open_count(&decision.symbol),
            last_order_time_ms: self.store.last_order_time(&decision.symbol),
            portfolio_value,
            reasons: decision.reasons,
            required_indicators: channel.required_indicators.clone(),
        }
    }

    async fn execute(
        &self,
        decision: &SignalDecision,
        side: Side,
        channel: &ChannelConfig,
    ) -> ExecutorResult<OrderOutcome> {
        let symbol = &decision.symbol;

        let Some(settings) = self.settings.get(symbol) else {
            self.placer.record_failure(
                symbol,
                side,
                decision.price,
                ReasonCode::NormalizationFailed,
                "no instrument settings",
            );
            return Ok(OrderOutcome::Failed);
        };
        let price = settings.spec.round_price(decision.price);
        if !price.is_positive() {
            self.placer.record_failure(
                symbol,
                side,
                decision.price,
                ReasonCode::NormalizationFailed,
                "price rounds to zero or below",
            );
            return Ok(OrderOutcome::Failed);
        }
        let raw_qty = Size::new(channel.trade_amount / price.inner());
        let qty = match settings.spec.normalize_qty(raw_qty) {
            Ok(qty) => qty,
            Err(e) => {
                warn!(symbol = %symbol, raw_qty = %raw_qty, error = %e, "Order quantity rejected");
                self.placer.record_failure(
                    symbol,
                    side,
                    price,
                    ReasonCode::NormalizationFailed,
                    e.to_string(),
                );
                return Ok(OrderOutcome::Failed);
            }
        };

        let order = match self.placer.place(symbol, side, qty, price).await {
            Ok(order) => order,
            Err(_) => return Ok(OrderOutcome::Failed),
        };
        let order_id = order
            .order_id
            .clone()
            .ok_or_else(|| ExecutorError::OrderNotFound(order.local_id.to_string()))?;

        let outcome = match self.poller.await_fill(&order.local_id).await? {
            FillOutcome::Filled { .. } => match self.protection.protect_filled(&order.local_id).await {
                Ok(Some(_)) => OrderOutcome::Protected { order_id },
                Ok(None) => OrderOutcome::ProtectionDeferred { order_id },
                Err(_) => OrderOutcome::ProtectionFailed { order_id },
            },
            FillOutcome::Terminal { status, .. } => OrderOutcome::Closed { order_id, status },
            FillOutcome::Timeout { .. } => {
                info!(order_id = %order_id, "Fill unconfirmed, handing over to reconciler");
                OrderOutcome::Deferred { order_id }
            }
        };
        Ok(outcome)
    }
}
