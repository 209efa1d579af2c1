//! signal_relay: a pluggable monitoring daemon.
//!
//! Monitors are polled on a fixed cadence; the signals they yield are
//! deduplicated against crash-safe state and dispatched as push
//! notifications, escalated to high priority when they carry tags.

#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod daemon;
pub mod dispatch;
pub mod logger;
pub mod notify;
pub mod registry;
pub mod state;
