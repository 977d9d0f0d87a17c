//! Exchange and notification boundaries for sentinel.
//!
//! The engine talks to the outside world only through two traits:
//! - `ExchangeAdapter`: order placement, open orders, history, cancellation
//! - `Notifier`: fire-and-forget operator notifications
//!
//! Shipped implementations:
//! - `MockExchange`: scripted, call-counting adapter for tests
//! - `PaperExchange`: fills entries after a fixed number of polls
//! - `LogNotifier` / `RecordingNotifier`

pub mod adapter;
pub mod error;
pub mod mock;
pub mod notifier;
pub mod paper;

pub use adapter::{DynExchange, ExchangeAdapter, ExchangeOrder, Fill, OrderAck, OrderRequest};
pub use error::{AdapterError, AdapterResult, NotifyError};
pub use mock::{MockExchange, MockStep};
pub use notifier::{DynNotifier, LogNotifier, Notification, Notifier, Priority, RecordingNotifier};
pub use paper::PaperExchange;
