//! Signal gate: alert throttling per (symbol, side, strategy) channel.
//!
//! # Check order
//!
//! 0. Alert disabled for the symbol, or decision does not target this side
//!    (ThrottleState untouched)
//! 1. No state yet: EMIT and create it
//! 2. `force_next_signal`: EMIT, flag cleared
//! 3. Elapsed since last alert < cooldown: SKIP, price not evaluated
//! 4. Price change from baseline < strategy minimum: SKIP
//! 5. EMIT
//!
//! Steps 1-5 run under the channel's lock, so two concurrent evaluations of
//! one channel never both emit. Every outcome is recorded as ALERT_SENT or
//! ALERT_BLOCKED.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use sentinel_core::{
    Decision, DynClock, EventDraft, EventSink, EventType, Price, ReasonCode, Side, Symbol,
};
use sentinel_telemetry::Metrics;

use crate::throttle::{ThrottleKey, ThrottleState, ThrottleStore};

/// Signal gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalGateConfig {
    /// Minimum seconds between two alerts on one channel.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_cooldown_seconds() -> u64 {
    60
}

impl Default for SignalGateConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Per-strategy throttle parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyThrottle {
    pub strategy_key: String,
    /// Minimum absolute % move from baseline before re-alerting.
    pub min_price_change_pct: Decimal,
    /// Hash of the strategy parameters, stored on newly created states.
    pub config_hash: u64,
}

/// One channel evaluation request.
#[derive(Debug, Clone)]
pub struct SignalInput {
    pub symbol: Symbol,
    pub side: Side,
    pub decision: Decision,
    pub price: Price,
    pub alert_enabled: bool,
}

/// Why an alert was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    FirstSignal,
    Forced,
    ThresholdsMet,
}

impl EmitKind {
    pub fn code(&self) -> ReasonCode {
        match self {
            Self::FirstSignal => ReasonCode::FirstSignal,
            Self::Forced => ReasonCode::ForcedSignal,
            Self::ThresholdsMet => ReasonCode::ThresholdsMet,
        }
    }
}

/// Why an alert was suppressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertSkipReason {
    AlertDisabled,
    NoSignal,
    ThrottledTimeGate { elapsed_ms: u64, cooldown_ms: u64 },
    ThrottledPriceGate { change_pct: Decimal, min_pct: Decimal },
}

impl AlertSkipReason {
    pub fn code(&self) -> ReasonCode {
        match self {
            Self::AlertDisabled => ReasonCode::AlertDisabled,
            Self::NoSignal => ReasonCode::NoSignal,
            Self::ThrottledTimeGate { .. } => ReasonCode::ThrottledTimeGate,
            Self::ThrottledPriceGate { .. } => ReasonCode::ThrottledPriceGate,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::ThrottledTimeGate {
                elapsed_ms,
                cooldown_ms,
            } => Some(format!("elapsed {elapsed_ms}ms < cooldown {cooldown_ms}ms")),
            Self::ThrottledPriceGate {
                change_pct,
                min_pct,
            } => Some(format!(
                "price change {:.4}% < min {}%",
                change_pct, min_pct
            )),
            _ => None,
        }
    }
}

/// Signal gate outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    Emit(EmitKind),
    Skip(AlertSkipReason),
}

impl AlertDecision {
    pub fn is_emit(&self) -> bool {
        matches!(self, Self::Emit(_))
    }

    pub fn code(&self) -> ReasonCode {
        match self {
            Self::Emit(kind) => kind.code(),
            Self::Skip(reason) => reason.code(),
        }
    }
}

/// Alert gate over a shared `ThrottleStore`.
pub struct SignalGate {
    config: SignalGateConfig,
    store: Arc<ThrottleStore>,
    events: Arc<dyn EventSink>,
    clock: DynClock,
}

impl SignalGate {
    pub fn new(
        config: SignalGateConfig,
        store: Arc<ThrottleStore>,
        events: Arc<dyn EventSink>,
        clock: DynClock,
    ) -> Self {
        Self {
            config,
            store,
            events,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<ThrottleStore> {
        &self.store
    }

    /// Evaluate one channel and record the outcome.
    pub fn evaluate(&self, input: &SignalInput, strategy: &StrategyThrottle) -> AlertDecision {
        let now = self.clock.now_ms();

        let decision = if !input.alert_enabled {
            AlertDecision::Skip(AlertSkipReason::AlertDisabled)
        } else if !input.decision.matches(input.side) {
            AlertDecision::Skip(AlertSkipReason::NoSignal)
        } else {
            let key = ThrottleKey::new(
                input.symbol.clone(),
                input.side,
                strategy.strategy_key.clone(),
            );
            let cooldown_ms = self.config.cooldown_seconds * 1000;
            self.store.with_state(&key, |slot| {
                check_and_update(slot, input.price, now, cooldown_ms, strategy)
            })
        };

        self.record(input, &decision, now);
        decision
    }

    fn record(&self, input: &SignalInput, decision: &AlertDecision, now: u64) {
        let side = input.side.as_str();
        let code = decision.code();
        Metrics::alert_decision(input.symbol.as_str(), side, code.as_str());

        let draft = match decision {
            AlertDecision::Emit(kind) => {
                debug!(
                    symbol = %input.symbol,
                    side,
                    price = %input.price,
                    kind = ?kind,
                    "Alert emitted"
                );
                EventDraft::new(
                    input.symbol.clone(),
                    input.side,
                    EventType::AlertSent,
                    code,
                    now,
                )
            }
            AlertDecision::Skip(reason) => {
                trace!(symbol = %input.symbol, side, reason = ?reason, "Alert skipped");
                let draft = EventDraft::new(
                    input.symbol.clone(),
                    input.side,
                    EventType::AlertBlocked,
                    code,
                    now,
                );
                match reason.detail() {
                    Some(detail) => draft.with_detail(detail),
                    None => draft,
                }
            }
        };

        self.events.record(draft.with_price(input.price));
    }
}

/// Steps 1-5, run under the channel lock.
fn check_and_update(
    slot: &mut Option<ThrottleState>,
    price: Price,
    now: u64,
    cooldown_ms: u64,
    strategy: &StrategyThrottle,
) -> AlertDecision {
    let state = match slot {
        None => {
            *slot = Some(ThrottleState {
                baseline_price: price,
                last_sent_at: Some(now),
                config_hash: strategy.config_hash,
                force_next_signal: false,
            });
            return AlertDecision::Emit(EmitKind::FirstSignal);
        }
        Some(state) => state,
    };

    let kind = if state.force_next_signal {
        EmitKind::Forced
    } else {
        if let Some(last_sent) = state.last_sent_at {
            let elapsed_ms = now.saturating_sub(last_sent);
            if elapsed_ms < cooldown_ms {
                return AlertDecision::Skip(AlertSkipReason::ThrottledTimeGate {
                    elapsed_ms,
                    cooldown_ms,
                });
            }
        }

        // Zero baseline has no defined % change and passes
        if let Some(change_pct) = price.abs_pct_change_from(state.baseline_price) {
            if change_pct < strategy.min_price_change_pct {
                return AlertDecision::Skip(AlertSkipReason::ThrottledPriceGate {
                    change_pct,
                    min_pct: strategy.min_price_change_pct,
                });
            }
        }
        EmitKind::ThresholdsMet
    };

    state.baseline_price = price;
    state.last_sent_at = Some(now);
    state.force_next_signal = false;
    AlertDecision::Emit(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::ManualClock;
    use sentinel_persistence::{EventFilter, EventLog};

    const START_MS: u64 = 1_700_000_000_000;

    struct Harness {
        gate: SignalGate,
        clock: Arc<ManualClock>,
        events: Arc<EventLog>,
        store: Arc<ThrottleStore>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(START_MS));
        let events = Arc::new(EventLog::new());
        let store = Arc::new(ThrottleStore::new());
        let gate = SignalGate::new(
            SignalGateConfig::default(),
            store.clone(),
            events.clone(),
            clock.clone(),
        );
        Harness {
            gate,
            clock,
            events,
            store,
        }
    }

    fn strategy() -> StrategyThrottle {
        StrategyThrottle {
            strategy_key: "momentum".to_string(),
            min_price_change_pct: dec!(1),
            config_hash: 7,
        }
    }

    fn input(side: Side, price: Price) -> SignalInput {
        SignalInput {
            symbol: Symbol::from("BTCUSDT"),
            side,
            decision: match side {
                Side::Buy => Decision::Buy,
                Side::Sell => Decision::Sell,
            },
            price,
            alert_enabled: true,
        }
    }

    fn key(side: Side) -> ThrottleKey {
        ThrottleKey::new(Symbol::from("BTCUSDT"), side, "momentum")
    }

    #[test]
    fn test_first_signal_emits_and_creates_state() {
        let h = harness();
        let decision = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());

        assert_eq!(decision, AlertDecision::Emit(EmitKind::FirstSignal));
        let state = h.store.get(&key(Side::Buy)).unwrap();
        assert_eq!(state.baseline_price, Price::new(dec!(100)));
        assert_eq!(state.last_sent_at, Some(START_MS));
        assert_eq!(state.config_hash, 7);

        let sent = h.events.query(&EventFilter::new().event_type(EventType::AlertSent));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reason_code, ReasonCode::FirstSignal);
    }

    #[test]
    fn test_time_gate_skips_without_price_check() {
        let h = harness();
        h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        h.clock.advance_secs(30);

        // 50% move would pass the price gate; the time gate must win
        let decision = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(150))), &strategy());
        assert_eq!(
            decision,
            AlertDecision::Skip(AlertSkipReason::ThrottledTimeGate {
                elapsed_ms: 30_000,
                cooldown_ms: 60_000,
            })
        );

        let blocked = h.events.query(&EventFilter::new().event_type(EventType::AlertBlocked));
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].reason_code, ReasonCode::ThrottledTimeGate);
        // Baseline untouched by a skip
        assert_eq!(
            h.store.get(&key(Side::Buy)).unwrap().baseline_price,
            Price::new(dec!(100))
        );
    }

    #[test]
    fn test_price_gate_after_cooldown() {
        let h = harness();
        h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        h.clock.advance_secs(61);

        let decision = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100.5))), &strategy());
        assert_eq!(decision.code(), ReasonCode::ThrottledPriceGate);

        let decision = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(101))), &strategy());
        assert_eq!(decision, AlertDecision::Emit(EmitKind::ThresholdsMet));
        let state = h.store.get(&key(Side::Buy)).unwrap();
        assert_eq!(state.baseline_price, Price::new(dec!(101)));
        assert_eq!(state.last_sent_at, Some(START_MS + 61_000));
    }

    #[test]
    fn test_force_bypasses_gates_and_clears_once() {
        let h = harness();
        h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        h.store
            .force_next_signal(&Symbol::from("BTCUSDT"), "momentum");
        // Setting the flag does not move last_sent_at
        assert_eq!(
            h.store.get(&key(Side::Buy)).unwrap().last_sent_at,
            Some(START_MS)
        );

        h.clock.advance_secs(1);
        let forced = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        assert_eq!(forced, AlertDecision::Emit(EmitKind::Forced));
        assert!(!h.store.get(&key(Side::Buy)).unwrap().force_next_signal);

        h.clock.advance_secs(1);
        let next = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        assert_eq!(next.code(), ReasonCode::ThrottledTimeGate);
    }

    #[test]
    fn test_sides_are_independent() {
        let h = harness();
        h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        h.clock.advance_secs(5);

        // SELL has no state of its own: first signal even though BUY is cooling down
        let sell = h.gate.evaluate(&input(Side::Sell, Price::new(dec!(100))), &strategy());
        assert_eq!(sell, AlertDecision::Emit(EmitKind::FirstSignal));

        let buy = h.store.get(&key(Side::Buy)).unwrap();
        let sell = h.store.get(&key(Side::Sell)).unwrap();
        assert_eq!(buy.last_sent_at, Some(START_MS));
        assert_eq!(sell.last_sent_at, Some(START_MS + 5_000));
    }

    #[test]
    fn test_disabled_and_mismatched_decisions_skip_without_state() {
        let h = harness();
        let mut disabled = input(Side::Buy, Price::new(dec!(100)));
        disabled.alert_enabled = false;
        assert_eq!(
            h.gate.evaluate(&disabled, &strategy()),
            AlertDecision::Skip(AlertSkipReason::AlertDisabled)
        );

        let mut wait = input(Side::Buy, Price::new(dec!(100)));
        wait.decision = Decision::Wait;
        assert_eq!(
            h.gate.evaluate(&wait, &strategy()),
            AlertDecision::Skip(AlertSkipReason::NoSignal)
        );

        assert!(h.store.is_empty());
        assert_eq!(
            h.events
                .count(&EventFilter::new().event_type(EventType::AlertBlocked)),
            2
        );
    }

    #[test]
    fn test_zero_baseline_passes_price_gate() {
        let h = harness();
        h.store.with_state(&key(Side::Buy), |s| {
            *s = Some(ThrottleState {
                baseline_price: Price::ZERO,
                last_sent_at: None,
                config_hash: 7,
                force_next_signal: false,
            })
        });

        let decision = h.gate.evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy());
        assert_eq!(decision, AlertDecision::Emit(EmitKind::ThresholdsMet));
    }

    #[test]
    fn test_concurrent_evaluations_emit_once() {
        let h = harness();
        let strategy = strategy();

        let emits: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        h.gate
                            .evaluate(&input(Side::Buy, Price::new(dec!(100))), &strategy)
                            .is_emit()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|emitted| *emitted)
                .count()
        });

        assert_eq!(emits, 1);
        assert_eq!(h.events.len(), 8);
    }
}
