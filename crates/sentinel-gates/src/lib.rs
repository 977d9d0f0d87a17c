//! Decision gates for sentinel.
//!
//! Two independent gates sit between the evaluator and the outside world:
//! - `SignalGate`: throttles alerts per (symbol, side, strategy) channel
//! - `TradeGate`: decides whether a decision may become an order
//!
//! Neither gate reads the other's state or outcome. Every terminal outcome
//! is recorded as a lifecycle event.

pub mod error;
pub mod signal_gate;
pub mod throttle;
pub mod trade_gate;

pub use error::{GateError, GateResult};
pub use signal_gate::{
    AlertDecision, AlertSkipReason, EmitKind, SignalGate, SignalGateConfig, SignalInput,
    StrategyThrottle,
};
pub use throttle::{ThrottleKey, ThrottleState, ThrottleStore};
pub use trade_gate::{TradeDecision, TradeGate, TradeGateConfig, TradeRequest, TradeSkipReason};
