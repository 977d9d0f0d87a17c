//! Adapter error types.

use thiserror::Error;

/// Exchange adapter failure.
///
/// `Transient` failures (network, rate limit, timeout) are safe to retry on a
/// later cycle. `Terminal` failures (auth, insufficient balance, rejection)
/// stop the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("terminal: {0}")]
    Terminal(String),
}

impl AdapterError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Clone, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);
