//! Append-only lifecycle event log.
//!
//! The canonical record of what every gate, placement and protection attempt
//! decided. Events are kept in memory for queries and, when a journal
//! directory is configured, appended to `events_<date>.jsonl`.
//!
//! Order-scoped events (see [`EventType::is_order_scoped`]) are idempotent:
//! a second event with the same (type, order_id) is dropped.

use std::collections::HashSet;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use sentinel_core::{
    EventDraft, EventSink, EventType, LifecycleEvent, OrderId, Side, Symbol,
};

use crate::writer::JsonLinesWriter;

/// Query filter over recorded events. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub symbol: Option<Symbol>,
    pub side: Option<Side>,
    pub event_type: Option<EventType>,
    /// Inclusive lower bound (Unix ms).
    pub since_ms: Option<u64>,
    /// Exclusive upper bound (Unix ms).
    pub until_ms: Option<u64>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    #[must_use]
    pub fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    #[must_use]
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    #[must_use]
    pub fn between(mut self, since_ms: u64, until_ms: u64) -> Self {
        self.since_ms = Some(since_ms);
        self.until_ms = Some(until_ms);
        self
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        self.symbol.as_ref().map_or(true, |s| *s == event.symbol)
            && self.side.map_or(true, |s| s == event.side)
            && self.event_type.map_or(true, |t| t == event.event_type)
            && self.since_ms.map_or(true, |t| event.timestamp_ms >= t)
            && self.until_ms.map_or(true, |t| event.timestamp_ms < t)
    }
}

#[derive(Default)]
struct LogInner {
    events: Vec<LifecycleEvent>,
    seen: HashSet<(EventType, OrderId)>,
    next_id: u64,
}

/// In-memory event log with optional JSON Lines journal.
pub struct EventLog {
    inner: RwLock<LogInner>,
    journal: Option<Mutex<JsonLinesWriter<LifecycleEvent>>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Memory-only log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                next_id: 1,
                ..LogInner::default()
            }),
            journal: None,
        }
    }

    /// Log that also journals every event under `data_dir`.
    pub fn with_journal(data_dir: &str, buffer_size: usize) -> Self {
        let mut log = Self::new();
        log.journal = Some(Mutex::new(JsonLinesWriter::new(
            data_dir,
            "events",
            buffer_size,
        )));
        log
    }

    /// Events matching `filter`, oldest first.
    pub fn query(&self, filter: &EventFilter) -> Vec<LifecycleEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn count(&self, filter: &EventFilter) -> usize {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the journal, if any.
    pub fn flush(&self) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.lock().flush() {
                warn!(?e, "Failed to flush event journal");
            }
        }
    }
}

impl EventSink for EventLog {
    fn record(&self, draft: EventDraft) -> Option<u64> {
        let event = {
            let mut inner = self.inner.write();

            if draft.event_type.is_order_scoped() {
                if let Some(order_id) = &draft.order_id {
                    let key = (draft.event_type, order_id.clone());
                    if !inner.seen.insert(key) {
                        debug!(
                            event_type = %draft.event_type,
                            order_id = %order_id,
                            "Duplicate order event dropped"
                        );
                        return None;
                    }
                }
            }

            let id = inner.next_id;
            inner.next_id += 1;
            let event = draft.into_event(id);
            inner.events.push(event.clone());
            event
        };

        trace!(
            id = event.id,
            symbol = %event.symbol,
            side = %event.side,
            event_type = %event.event_type,
            reason = %event.reason_code,
            "Lifecycle event recorded"
        );

        let id = event.id;
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.lock().add_record(event) {
                warn!(?e, id, "Failed to journal lifecycle event");
            }
        }

        Some(id)
    }
}
