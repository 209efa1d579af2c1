//! Log-only transport for dry runs: the notification becomes an activity event.

use crate::core::errors::Result;
use crate::core::signal::Notification;
use crate::logger::{ActivityEvent, ActivityLog, Level};

use super::Transport;

#[derive(Debug, Clone)]
pub struct LogTransport {
    log: ActivityLog,
}

impl LogTransport {
    #[must_use]
    pub fn new(log: ActivityLog) -> Self {
        Self { log }
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, notification: &Notification) -> Result<()> {
        let title = notification.title.as_deref().unwrap_or("(untitled)");
        self.log.emit(
            ActivityEvent::new(Level::Info, "transport", "delivered").detail(format!(
                "priority={} title={title:?} message={:?}",
                notification.priority, notification.message
            )),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signal::Priority;

    #[test]
    fn always_succeeds_and_logs() {
        let log = ActivityLog::capture();
        LogTransport::new(log.clone())
            .send(&Notification::new("hello", Priority::High).with_title("t"))
            .unwrap();
        let events = log.events_named("delivered");
        assert_eq!(events.len(), 1);
        assert!(events[0].detail.contains("priority=high"));
    }
}
