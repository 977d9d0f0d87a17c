//! Executor error types.

use thiserror::Error;

use sentinel_core::{OrderId, Symbol};
use sentinel_exchange::AdapterError;

use crate::normalize::NormalizationError;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Exchange adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Quantity normalization failed: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No instrument settings for {0}")]
    MissingSettings(Symbol),

    #[error("Protection failed for order {order_id}: {reason}")]
    ProtectionFailed { order_id: OrderId, reason: String },
}

impl ExecutorError {
    /// True if a later cycle may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Adapter(e) if e.is_transient())
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
