//! SIGINT/SIGTERM → cooperative shutdown.

use std::thread::JoinHandle;

use super::shutdown::ShutdownHandle;
use crate::core::errors::{Result, SrdError};
use crate::logger::ActivityLog;

/// Spawn a thread that turns the first SIGINT or SIGTERM into a shutdown
/// request. A second signal while shutting down is logged and ignored; the
/// in-flight tick always completes.
#[cfg(unix)]
pub fn install(shutdown: &ShutdownHandle, log: &ActivityLog) -> Result<JoinHandle<()>> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| SrdError::Runtime {
        details: format!("cannot install signal handlers: {e}"),
    })?;
    let shutdown = shutdown.clone();
    let log = log.clone();
    std::thread::Builder::new()
        .name("srd-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                let name = if signal == SIGINT { "SIGINT" } else { "SIGTERM" };
                if shutdown.is_triggered() {
                    log.warn("daemon", "signal_ignored", format!("{name}: already stopping"));
                } else {
                    log.info("daemon", "shutdown_requested", name);
                    shutdown.trigger();
                }
            }
        })
        .map_err(|e| SrdError::Runtime {
            details: format!("cannot spawn signal thread: {e}"),
        })
}

#[cfg(not(unix))]
pub fn install(_shutdown: &ShutdownHandle, log: &ActivityLog) -> Result<JoinHandle<()>> {
    log.warn("daemon", "signals_unsupported", "no signal handling on this platform");
    std::thread::Builder::new()
        .name("srd-signals".to_string())
        .spawn(|| {})
        .map_err(|e| SrdError::Runtime {
            details: format!("cannot spawn signal thread: {e}"),
        })
}
