//! Sentinel application.
//!
//! Wires the engine together and drives it:
//! - configuration loading, validation and per-tick reload
//! - the signal source feeding one decision per symbol per tick
//! - the scheduler evaluating every symbol concurrently
//! - the reconciler task running beside it

pub mod app;
pub mod config;
pub mod error;
pub mod source;

pub use app::{Application, Components, CycleReport};
pub use config::{AppConfig, OperatingMode};
pub use error::{AppError, AppResult};
pub use source::{DynSignalSource, FileSignalSource, MemorySignalSource, SignalSnapshot, SignalSource};
