//! Bounded retry with exponential backoff and jitter around any transport.
//!
//! Only errors flagged retryable are retried; a permanent failure (bad
//! credentials, missing program) returns immediately.

use std::time::Duration;

use rand::Rng as _;

use crate::core::errors::Result;
use crate::core::signal::Notification;
use crate::logger::ActivityLog;

use super::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least one.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let spread = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX);
        if spread == 0 {
            return base;
        }
        let extra = Duration::from_millis(rand::rng().random_range(0..=spread));
        (base + extra).min(self.max_delay)
    }
}

pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
    log: ActivityLog,
}

impl<T: Transport> RetryingTransport<T> {
    #[must_use]
    pub fn new(inner: T, policy: RetryPolicy, log: ActivityLog) -> Self {
        Self { inner, policy, log }
    }
}

impl<T: Transport> Transport for RetryingTransport<T> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn send(&self, notification: &Notification) -> Result<()> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.send(notification) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let delay = self.policy.jittered_delay(attempt);
                    self.log.warn(
                        "transport",
                        "send_retry",
                        format!(
                            "attempt={attempt}/{attempts} wait_ms={} error={err}",
                            delay.as_millis()
                        ),
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
