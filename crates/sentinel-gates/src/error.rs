//! Gate error types.
//!
//! Gate skips are values, not errors. Only snapshot I/O can fail here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Throttle snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Throttle snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type GateResult<T> = Result<T, GateError>;
