//! Daemon subsystem: bootstrap, the polling loop, shutdown and signal handling.

pub mod bootstrap;
pub mod loop_main;
pub mod shutdown;
#[cfg(feature = "daemon")]
pub mod signals;

pub use bootstrap::{Engine, StartupOptions};
pub use loop_main::{MonitorSlot, RunSummary, Runner, RunnerPhase, RunnerSettings, TickReport};
pub use shutdown::ShutdownHandle;
