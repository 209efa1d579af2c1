//! Notification transports.
//!
//! The dispatcher only needs `send(notification) -> Result<()>`. Concrete
//! transports decide the wire format; [`retry::RetryingTransport`] layers the
//! configurable retry policy over any of them.

pub mod command;
pub mod console;
pub mod pushover;
pub mod recording;
pub mod retry;

use std::time::Duration;

use crate::core::config::{NotifyConfig, TransportKind};
use crate::core::errors::Result;
use crate::core::signal::Notification;
use crate::logger::ActivityLog;

pub use command::CommandTransport;
pub use console::LogTransport;
pub use pushover::PushoverTransport;
pub use recording::RecordingTransport;
pub use retry::{RetryPolicy, RetryingTransport};

/// Capability to deliver one notification.
pub trait Transport: Send {
    /// Short stable name for logs and errors.
    fn name(&self) -> &'static str;

    /// Deliver or fail. Implementations must not panic on provider errors.
    fn send(&self, notification: &Notification) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn send(&self, notification: &Notification) -> Result<()> {
        (**self).send(notification)
    }
}

/// Build the configured transport wrapped in its retry policy.
#[must_use]
pub fn from_config(config: &NotifyConfig, log: &ActivityLog) -> Box<dyn Transport> {
    let inner: Box<dyn Transport> = match config.transport {
        TransportKind::Pushover => Box::new(PushoverTransport::new(config.pushover.clone())),
        TransportKind::Command => Box::new(CommandTransport::new(config.command.clone())),
        TransportKind::Log => Box::new(LogTransport::new(log.clone())),
    };
    let policy = RetryPolicy {
        attempts: config.retry_attempts.max(1),
        initial_delay: Duration::from_millis(config.retry_initial_ms),
        max_delay: Duration::from_millis(config.retry_max_ms),
    };
    Box::new(RetryingTransport::new(inner, policy, log.clone()))
}

/// Truncate to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
