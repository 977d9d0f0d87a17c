//! Persistence for sentinel.
//!
//! - [`EventLog`]: append-only, queryable lifecycle event log (the audit trail)
//! - [`JsonLinesWriter`]: daily-rotated JSON Lines journal used by the event
//!   log and the order store

pub mod error;
pub mod event_log;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use event_log::{EventFilter, EventLog};
pub use writer::JsonLinesWriter;
