//! Operator notifications.
//!
//! Fire-and-forget: a failed notification is logged by the caller and never
//! rolls back a committed transition. Notification text is never read back as
//! data; the event log is the record.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use sentinel_core::BoxFuture;

use crate::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    /// Needs operator attention (e.g. unprotected position).
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub priority: Priority,
    pub message: String,
}

impl Notification {
    pub fn normal(message: impl Into<String>) -> Self {
        Self {
            priority: Priority::Normal,
            message: message.into(),
        }
    }

    pub fn high(message: impl Into<String>) -> Self {
        Self {
            priority: Priority::High,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        match notification.priority {
            Priority::Normal => info!(message = %notification.message, "NOTIFY"),
            Priority::High => warn!(message = %notification.message, "NOTIFY (high priority)"),
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Keeps every notification for assertions; can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `notify` calls fail (they are still recorded).
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn high_priority(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.priority == Priority::High)
            .cloned()
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            self.sent.lock().push(notification);
            if *self.fail.lock() {
                return Err(NotifyError("channel unavailable".to_string()));
            }
            Ok(())
        })
    }
}
