//! State store: crash-safe, per-monitor record of already-notified dedup keys.

pub mod backend;
pub mod snapshot;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, SnapshotBackend};
pub use snapshot::{NotificationRecord, Snapshot};
pub use store::StateStore;
