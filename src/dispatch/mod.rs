//! Notification dispatch: novelty check, priority, delivery, commit.

#![allow(missing_docs)]

use std::fmt;

use chrono::Utc;

use crate::core::signal::{CandidateSignal, Notification, Priority};
use crate::logger::{ActivityEvent, ActivityLog, Level};
use crate::notify::Transport;
use crate::state::StateStore;

/// Why a novel signal did not end up both delivered and recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Transport failed; nothing was recorded, so a later tick retries.
    NotSent(String),
    /// Delivered, but the commit failed. The next tick will send it again.
    SentNotRecorded(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSent(details) => write!(f, "not sent: {details}"),
            Self::SentNotRecorded(details) => write!(f, "sent but not recorded: {details}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Notified { priority: Priority },
    /// A novel record-only signal was committed without being sent.
    Recorded,
    Suppressed,
    Failed(FailureReason),
}

/// `High` iff the signal carries structured tags.
#[must_use]
pub fn compute_priority(signal: &CandidateSignal) -> Priority {
    if signal.tags.is_empty() {
        Priority::Normal
    } else {
        Priority::High
    }
}

/// Owns the store and the transport for the life of the runner.
pub struct Dispatcher {
    store: StateStore,
    transport: Box<dyn Transport>,
    log: ActivityLog,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: StateStore, transport: Box<dyn Transport>, log: ActivityLog) -> Self {
        Self {
            store,
            transport,
            log,
        }
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    #[must_use]
    pub fn into_store(self) -> StateStore {
        self.store
    }

    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Send an unrecorded notification (startup notice). Never touches state.
    pub fn announce(&self, notification: &Notification) -> crate::core::errors::Result<()> {
        self.transport.send(notification)
    }

    /// Decide what happens to one candidate signal.
    ///
    /// A key already in the store is suppressed without calling the
    /// transport. A novel record-only signal is committed and never sent.
    /// Otherwise the notification is sent and, only on success, committed.
    pub fn evaluate(&mut self, monitor_id: &str, signal: &CandidateSignal) -> DispatchOutcome {
        let priority = compute_priority(signal);
        let key = signal.dedup_key.as_str();

        if self.store.contains(monitor_id, key) {
            self.log.emit(
                ActivityEvent::new(Level::Info, "dispatch", "suppressed")
                    .monitor(monitor_id)
                    .key(key),
            );
            return DispatchOutcome::Suppressed;
        }

        if signal.record_only {
            return self.record_silently(monitor_id, key);
        }

        let notification = Notification::from_signal(signal, priority);
        if let Err(err) = self.transport.send(&notification) {
            self.log.emit(
                ActivityEvent::new(Level::Warn, "dispatch", "not_sent")
                    .monitor(monitor_id)
                    .key(key)
                    .detail(err.to_string()),
            );
            return DispatchOutcome::Failed(FailureReason::NotSent(err.to_string()));
        }

        match self.store.commit(monitor_id, key, Utc::now()) {
            Ok(()) => {
                self.log.emit(
                    ActivityEvent::new(Level::Info, "dispatch", "notified")
                        .monitor(monitor_id)
                        .key(key)
                        .detail(format!("priority={priority} via={}", self.transport.name())),
                );
                DispatchOutcome::Notified { priority }
            }
            Err(err) => {
                self.log.emit(
                    ActivityEvent::new(Level::Error, "dispatch", "sent_not_recorded")
                        .monitor(monitor_id)
                        .key(key)
                        .detail(format!(
                            "SENT BUT NOT RECORDED, expect a duplicate on the next tick: {err}"
                        )),
                );
                DispatchOutcome::Failed(FailureReason::SentNotRecorded(err.to_string()))
            }
        }
    }

    fn record_silently(&mut self, monitor_id: &str, key: &str) -> DispatchOutcome {
        match self.store.commit(monitor_id, key, Utc::now()) {
            Ok(()) => {
                self.log.emit(
                    ActivityEvent::new(Level::Info, "dispatch", "recorded")
                        .monitor(monitor_id)
                        .key(key),
                );
                DispatchOutcome::Recorded
            }
            Err(err) => {
                self.log.emit(
                    ActivityEvent::new(Level::Warn, "dispatch", "not_recorded")
                        .monitor(monitor_id)
                        .key(key)
                        .detail(err.to_string()),
                );
                DispatchOutcome::Failed(FailureReason::NotSent(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingTransport;
    use crate::state::MemoryBackend;
    use proptest::prelude::*;

    fn dispatcher(backend: &MemoryBackend, transport: &RecordingTransport) -> (Dispatcher, ActivityLog) {
        let log = ActivityLog::capture();
        let store = StateStore::load(Box::new(backend.clone())).unwrap();
        (
            Dispatcher::new(store, Box::new(transport.clone()), log.clone()),
            log,
        )
    }

    #[test]
    fn novel_tagged_signal_is_sent_high_and_committed() {
        let backend = MemoryBackend::new();
        let transport = RecordingTransport::new();
        let (mut dispatcher, _log) = dispatcher(&backend, &transport);

        let signal = CandidateSignal::new("post-123", "buy").with_tags(["AAPL"]);
        assert_eq!(
            dispatcher.evaluate("A", &signal),
            DispatchOutcome::Notified {
                priority: Priority::High
            }
        );
        assert_eq!(transport.sent_with(Priority::High), 1);
        assert!(dispatcher.store().contains("A", "post-123"));
        assert_eq!(backend.writes(), 1);
    }

    #[test]
    fn known_key_is_suppressed_without_side_effects() {
        let backend = MemoryBackend::new();
        let transport = RecordingTransport::new();
        let (mut dispatcher, log) = dispatcher(&backend, &transport);
        let signal = CandidateSignal::new("k", "m");

        dispatcher.evaluate("A", &signal);
        assert_eq!(dispatcher.evaluate("A", &signal), DispatchOutcome::Suppressed);
        assert_eq!(transport.attempts(), 1);
        assert_eq!(backend.writes(), 1);
        assert_eq!(log.events_named("suppressed").len(), 1);
    }

    #[test]
    fn keys_are_scoped_per_monitor() {
        let backend = MemoryBackend::new();
        let transport = RecordingTransport::new();
        let (mut dispatcher, _log) = dispatcher(&backend, &transport);
        let signal = CandidateSignal::new("k", "m");
        dispatcher.evaluate("A", &signal);
        assert!(matches!(
            dispatcher.evaluate("B", &signal),
            DispatchOutcome::Notified { .. }
        ));
    }

    #[test]
    fn transport_failure_leaves_signal_eligible() {
        let backend = MemoryBackend::new();
        let transport = RecordingTransport::new();
        transport.fail_next(true);
        let (mut dispatcher, _log) = dispatcher(&backend, &transport);
        let signal = CandidateSignal::new("k", "m");

        assert!(matches!(
            dispatcher.evaluate("A", &signal),
            DispatchOutcome::Failed(FailureReason::NotSent(_))
        ));
        assert!(!dispatcher.store().contains("A", "k"));
        assert_eq!(backend.writes(), 0);

        assert!(matches!(
            dispatcher.evaluate("A", &signal),
            DispatchOutcome::Notified { .. }
        ));
    }

    #[test]
    fn commit_failure_is_flagged_loudly() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let transport = RecordingTransport::new();
        let (mut dispatcher, log) = dispatcher(&backend, &transport);

        let outcome = dispatcher.evaluate("A", &CandidateSignal::new("k", "m"));
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed(FailureReason::SentNotRecorded(_))
        ));
        assert_eq!(transport.sent().len(), 1);
        assert!(!dispatcher.store().contains("A", "k"));
        let loud = log.events_named("sent_not_recorded");
        assert_eq!(loud.len(), 1);
        assert_eq!(loud[0].level, Level::Error);
        assert_eq!(loud[0].dedup_key.as_deref(), Some("k"));
    }

    #[test]
    fn notification_carries_signal_fields() {
        let backend = MemoryBackend::new();
        let transport = RecordingTransport::new();
        let (mut dispatcher, _log) = dispatcher(&backend, &transport);
        let signal = CandidateSignal::new("k", "body")
            .with_title("New post")
            .with_url("https://example.test/p/1");
        dispatcher.evaluate("A", &signal);
        let sent = transport.sent();
        assert_eq!(sent[0].title.as_deref(), Some("New post"));
        assert_eq!(sent[0].url.as_deref(), Some("https://example.test/p/1"));
        assert_eq!(sent[0].priority, Priority::Normal);
    }

    #[test]
    fn record_only_signal_is_committed_without_sending() {
        let backend = MemoryBackend::new();
        let transport = RecordingTransport::new();
        let (mut dispatcher, log) = dispatcher(&backend, &transport);
        let history = CandidateSignal::new("post-1", "old").with_record_only(true);

        assert_eq!(dispatcher.evaluate("feed", &history), DispatchOutcome::Recorded);
        assert_eq!(transport.attempts(), 0);
        assert!(dispatcher.store().contains("feed", "post-1"));
        assert_eq!(log.events_named("recorded").len(), 1);

        // Once recorded, the same key is an ordinary duplicate.
        let again = CandidateSignal::new("post-1", "old");
        assert_eq!(dispatcher.evaluate("feed", &again), DispatchOutcome::Suppressed);
        assert_eq!(transport.attempts(), 0);
    }

    #[test]
    fn record_only_commit_failure_sends_nothing() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let transport = RecordingTransport::new();
        let (mut dispatcher, _log) = dispatcher(&backend, &transport);
        let outcome =
            dispatcher.evaluate("feed", &CandidateSignal::new("k", "m").with_record_only(true));
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed(FailureReason::NotSent(_))
        ));
        assert_eq!(transport.attempts(), 0);
        assert!(!dispatcher.store().contains("feed", "k"));
    }

    proptest! {
        #[test]
        fn priority_is_high_iff_tagged(
            key in "[a-z0-9-]{1,16}",
            message in ".{0,40}",
            tags in proptest::collection::vec("[A-Z]{1,5}", 0..4),
        ) {
            let signal = CandidateSignal::new(key, message).with_tags(tags.clone());
            let expected = if tags.is_empty() { Priority::Normal } else { Priority::High };
            prop_assert_eq!(compute_priority(&signal), expected);
            prop_assert_eq!(compute_priority(&signal), compute_priority(&signal.clone()));
        }

        #[test]
        fn repeated_evaluation_sends_once(key in "[a-z0-9]{1,12}", repeats in 1usize..6) {
            let backend = MemoryBackend::new();
            let transport = RecordingTransport::new();
            let (mut dispatcher, _log) = dispatcher(&backend, &transport);
            let signal = CandidateSignal::new(key, "m");
            for _ in 0..repeats {
                dispatcher.evaluate("A", &signal);
            }
            prop_assert_eq!(transport.sent().len(), 1);
            prop_assert_eq!(backend.writes(), 1);
        }
    }
}
