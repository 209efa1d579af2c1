//! Persisted snapshot model: monitor id → dedup key → first-notified time.
//!
//! Deserialization ignores unknown fields so older binaries keep reading files
//! written by newer ones.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Stored metadata for one notified key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub notified_at: DateTime<Utc>,
}

/// Evidence that `dedup_key` was notified for `monitor_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub monitor_id: String,
    pub dedup_key: String,
    pub notified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub monitors: BTreeMap<String, BTreeMap<String, KeyEntry>>,
}

const fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            monitors: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    #[must_use]
    pub fn contains(&self, monitor_id: &str, dedup_key: &str) -> bool {
        self.monitors
            .get(monitor_id)
            .is_some_and(|keys| keys.contains_key(dedup_key))
    }

    /// Insert a record unless one already exists. Returns whether it was new.
    pub fn insert(&mut self, monitor_id: &str, dedup_key: &str, at: DateTime<Utc>) -> bool {
        let keys = self.monitors.entry(monitor_id.to_string()).or_default();
        if keys.contains_key(dedup_key) {
            return false;
        }
        keys.insert(dedup_key.to_string(), KeyEntry { notified_at: at });
        true
    }

    /// Undo an [`Snapshot::insert`], dropping the monitor entry if it empties.
    pub fn remove(&mut self, monitor_id: &str, dedup_key: &str) {
        if let Some(keys) = self.monitors.get_mut(monitor_id) {
            keys.remove(dedup_key);
            if keys.is_empty() {
                self.monitors.remove(monitor_id);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records for one monitor, or all monitors when `monitor_id` is `None`.
    #[must_use]
    pub fn records(&self, monitor_id: Option<&str>) -> Vec<NotificationRecord> {
        self.monitors
            .iter()
            .filter(|(id, _)| monitor_id.is_none_or(|wanted| wanted == id.as_str()))
            .flat_map(|(id, keys)| {
                keys.iter().map(move |(key, entry)| NotificationRecord {
                    monitor_id: id.clone(),
                    dedup_key: key.clone(),
                    notified_at: entry.notified_at,
                })
            })
            .collect()
    }

    /// Drop records notified strictly before `cutoff`. Returns how many went.
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.len();
        for keys in self.monitors.values_mut() {
            keys.retain(|_, entry| entry.notified_at >= cutoff);
        }
        self.monitors.retain(|_, keys| !keys.is_empty());
        before - self.len()
    }
}
