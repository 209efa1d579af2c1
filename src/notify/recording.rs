//! In-memory transport that records deliveries and can be scripted to fail.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::{Result, SrdError};
use crate::core::signal::{Notification, Priority};

use super::Transport;

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<Notification>,
    attempts: usize,
    /// Scripted outcomes consumed per attempt; empty means succeed.
    script: VecDeque<Option<bool>>,
    fail_all: bool,
}

/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send until switched back.
    pub fn set_fail_all(&self, fail: bool) {
        self.inner.lock().fail_all = fail;
    }

    /// Queue one failing attempt; `retryable` controls the error flavour.
    pub fn fail_next(&self, retryable: bool) {
        self.inner.lock().script.push_back(Some(retryable));
    }

    /// Queue one succeeding attempt ahead of later scripted failures.
    pub fn succeed_next(&self) {
        self.inner.lock().script.push_back(None);
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.inner.lock().sent.clone()
    }

    #[must_use]
    pub fn sent_with(&self, priority: Priority) -> usize {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|n| n.priority == priority)
            .count()
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }
}

impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&self, notification: &Notification) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.attempts += 1;
        let scripted = inner.script.pop_front().flatten();
        if inner.fail_all || scripted.is_some() {
            return Err(SrdError::Transport {
                transport: "recording",
                details: "scripted failure".to_string(),
                retryable: scripted.unwrap_or(true),
            });
        }
        inner.sent.push(notification.clone());
        Ok(())
    }
}
