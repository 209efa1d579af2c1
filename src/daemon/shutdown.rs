//! Cooperative shutdown shared between the signal thread and the runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};

/// Clones share one flag. Triggering is idempotent and wakes a sleeping
/// runner immediately; an in-flight tick is never interrupted.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    #[must_use]
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // Full means a wakeup is already pending.
        let _ = self.wake_tx.try_send(());
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep up to `timeout`. Returns `true` if shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        select! {
            recv(self.wake_rx) -> _ => {}
            default(timeout) => {}
        }
        self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_trigger() {
        let handle = ShutdownHandle::new();
        assert!(!handle.wait(Duration::from_millis(10)));
    }

    #[test]
    fn trigger_from_another_thread_wakes_waiter() {
        let handle = ShutdownHandle::new();
        let remote = handle.clone();
        let started = Instant::now();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.trigger();
            remote.trigger();
        });
        assert!(handle.wait(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(10));
        thread.join().unwrap();
        assert!(handle.wait(Duration::from_secs(30)));
    }
}
