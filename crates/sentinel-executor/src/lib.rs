//! Order execution for sentinel.
//!
//! - `OrderPlacer`: submits orders and records placement outcomes
//! - `FillPoller`: bounded polling for confirmed fills
//! - `ProtectionOrchestrator`: stop-loss / take-profit legs after a fill
//! - `Reconciler`: periodic sync of local orders with exchange truth
//! - `DecisionPipeline`: gates through protection for one decision
//! - `OrderStore`: per-order locked records, cooldown ledger, symbol locks

pub mod error;
pub mod fill_poller;
pub mod normalize;
pub mod pipeline;
pub mod placer;
pub mod protection;
pub mod reconciler;
pub mod store;
pub mod truth;

pub use error::{ExecutorError, ExecutorResult};
pub use fill_poller::{FillOutcome, FillPoller, FillPollerConfig};
pub use normalize::{normalize, InstrumentSpec, NormalizationError};
pub use pipeline::{ChannelConfig, DecisionPipeline, OrderOutcome, PipelineOutcome};
pub use placer::OrderPlacer;
pub use protection::{
    protection_prices, ProtectionOrchestrator, ProtectionPair, ProtectionParams,
    SettingsRegistry, SymbolSettings,
};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerConfig};
pub use store::{OrderFilter, OrderStore, OrderTruth, SymbolLockGuard, Transition};
