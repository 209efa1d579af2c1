//! The dedup store: the only owner of the snapshot and its persisted form.

#![allow(missing_docs)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::backend::{FileBackend, SnapshotBackend};
use super::snapshot::{NotificationRecord, Snapshot};
use crate::core::errors::{Result, SrdError};

/// Crash-safe record of which dedup keys were already notified.
///
/// Single writer: callers serialize access (the runner is sequential). Every
/// commit rewrites the complete snapshot through the backend's atomic replace.
pub struct StateStore {
    backend: Box<dyn SnapshotBackend>,
    snapshot: Snapshot,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("location", &self.backend.location())
            .field("records", &self.snapshot.len())
            .finish()
    }
}

impl StateStore {
    /// Load from a JSON file. A missing file is a first run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::load(Box::new(FileBackend::new(path)))
    }

    /// Load the persisted snapshot from any backend.
    ///
    /// Unreadable or unparseable data is a [`SrdError::StateCorruption`]: the
    /// store never falls back to an empty snapshot over existing history.
    pub fn load(backend: Box<dyn SnapshotBackend>) -> Result<Self> {
        let location = backend.location();
        let bytes = backend.read().map_err(|e| SrdError::StateCorruption {
            path: location.clone(),
            details: format!("unreadable: {e}"),
        })?;
        let snapshot = match bytes {
            None => Snapshot::default(),
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| SrdError::StateCorruption {
                    path: location,
                    details: e.to_string(),
                })?
            }
        };
        Ok(Self { backend, snapshot })
    }

    #[must_use]
    pub fn location(&self) -> PathBuf {
        self.backend.location()
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn contains(&self, monitor_id: &str, dedup_key: &str) -> bool {
        self.snapshot.contains(monitor_id, dedup_key)
    }

    /// Whether any record exists for `monitor_id`.
    #[must_use]
    pub fn has_history(&self, monitor_id: &str) -> bool {
        self.snapshot
            .monitors
            .get(monitor_id)
            .is_some_and(|keys| !keys.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    #[must_use]
    pub fn records(&self, monitor_id: Option<&str>) -> Vec<NotificationRecord> {
        self.snapshot.records(monitor_id)
    }

    /// Record `(monitor_id, dedup_key)` and persist the full snapshot.
    ///
    /// An existing record is left untouched (first notification time wins) and
    /// nothing is written. On a persistence failure the in-memory snapshot is
    /// rolled back so it never diverges from disk.
    pub fn commit(&mut self, monitor_id: &str, dedup_key: &str, at: DateTime<Utc>) -> Result<()> {
        if !self.snapshot.insert(monitor_id, dedup_key, at) {
            return Ok(());
        }
        if let Err(err) = self.persist() {
            self.snapshot.remove(monitor_id, dedup_key);
            return Err(err);
        }
        Ok(())
    }

    /// Operator pruning: drop records older than `cutoff` and persist.
    ///
    /// Not used by the daemon; run it while the daemon is stopped, since a
    /// running daemon rewrites its own in-memory snapshot on the next commit.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let previous = self.snapshot.clone();
        let removed = self.snapshot.retain_since(cutoff);
        if removed == 0 {
            return Ok(0);
        }
        if let Err(err) = self.persist() {
            self.snapshot = previous;
            return Err(err);
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot)?;
        self.backend
            .write_atomic(&bytes)
            .map_err(|e| SrdError::StatePersistence {
                path: self.backend.location(),
                details: e.to_string(),
            })
    }
}
