//! Signal sources.
//!
//! The strategy evaluator runs outside this process and publishes one
//! decision per symbol; a source hands the latest set to the scheduler each
//! tick.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sentinel_core::{BoxFuture, Decision, Price, SignalDecision, SignalReasons, Symbol};

use crate::error::{AppError, AppResult};

/// One evaluator record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub symbol: Symbol,
    pub decision: Decision,
    pub price: Price,
    #[serde(default)]
    pub reasons: SignalReasons,
    /// Current exposure in the symbol, quote currency.
    #[serde(default)]
    pub portfolio_value: Decimal,
}

impl SignalSnapshot {
    pub fn new(symbol: impl Into<Symbol>, decision: Decision, price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            decision,
            price,
            reasons: SignalReasons::all_pass(),
            portfolio_value: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn with_portfolio_value(mut self, value: Decimal) -> Self {
        self.portfolio_value = value;
        self
    }

    #[must_use]
    pub fn with_reasons(mut self, reasons: SignalReasons) -> Self {
        self.reasons = reasons;
        self
    }

    pub fn decision(&self) -> SignalDecision {
        SignalDecision::new(self.symbol.clone(), self.decision, self.price)
            .with_reasons(self.reasons)
    }
}

pub trait SignalSource: Send + Sync {
    /// Latest decisions, at most one per symbol.
    fn fetch(&self) -> BoxFuture<'_, AppResult<Vec<SignalSnapshot>>>;
}

pub type DynSignalSource = Arc<dyn SignalSource>;

/// Reads a JSON array of snapshots. A missing file means no signals yet.
pub struct FileSignalSource {
    path: PathBuf,
}

impl FileSignalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SignalSource for FileSignalSource {
    fn fetch(&self) -> BoxFuture<'_, AppResult<Vec<SignalSnapshot>>> {
        Box::pin(async move {
            let content = match tokio::fs::read_to_string(&self.path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %self.path.display(), "No signal file yet");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            };
            serde_json::from_str(&content).map_err(|e| {
                AppError::Signals(format!("{}: {e}", self.path.display()))
            })
        })
    }
}

/// In-memory source, replaced wholesale by `set`.
#[derive(Default)]
pub struct MemorySignalSource {
    snapshots: Mutex<Vec<SignalSnapshot>>,
}

impl MemorySignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, snapshots: Vec<SignalSnapshot>) {
        *self.snapshots.lock() = snapshots;
    }
}

impl SignalSource for MemorySignalSource {
    fn fetch(&self) -> BoxFuture<'_, AppResult<Vec<SignalSnapshot>>> {
        let snapshots = self.snapshots.lock().clone();
        Box::pin(async move { Ok(snapshots) })
    }
}
