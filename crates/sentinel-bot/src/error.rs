//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signal source error: {0}")]
    Signals(String),

    #[error("Gate error: {0}")]
    Gate(#[from] sentinel_gates::GateError),

    #[error("Executor error: {0}")]
    Executor(#[from] sentinel_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sentinel_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
