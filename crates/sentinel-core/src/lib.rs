//! Core domain types for the sentinel engine.
//!
//! This crate provides the types shared by every other crate:
//! - `Symbol`, `Side`: channel identity
//! - `Price`, `Size`: precision-safe numeric types
//! - `SignalDecision`, `SignalReasons`: evaluator output
//! - `Order`, `OrderStatus`, `OrderRole`: order lifecycle records
//! - `LifecycleEvent`, `EventSink`: audit log records and the sink seam
//! - `Clock`: injectable time source (real and manual)

pub mod clock;
pub mod decimal;
pub mod error;
pub mod event;
pub mod order;
pub mod signal;
pub mod types;

pub use clock::{BoxFuture, Clock, DynClock, ManualClock, SystemClock};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use event::{EventDraft, EventSink, EventType, LifecycleEvent, ReasonCode};
pub use order::{
    LocalOrderId, Order, OrderId, OrderRole, OrderStatus, OrderType, ProtectionState,
};
pub use signal::{Check, Decision, Indicator, SignalDecision, SignalReasons};
pub use types::{Side, Symbol};
