//! Operator-supplied command transport.
//!
//! The program receives the notification in environment variables
//! (`SRD_TITLE`, `SRD_MESSAGE`, `SRD_URL`, `SRD_PRIORITY`, `SRD_PRIORITY_LEVEL`).
//! A zero exit status means delivered. The program runs in its own process
//! group, so a Ctrl-C aimed at the daemon does not cut a delivery short.

use std::process::{Command, Stdio};

use crate::core::config::CommandConfig;
use crate::core::errors::{Result, SrdError};
use crate::core::process;
use crate::core::signal::Notification;

use super::{Transport, truncate_chars};

#[derive(Debug, Clone)]
pub struct CommandTransport {
    config: CommandConfig,
}

impl CommandTransport {
    #[must_use]
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

impl Transport for CommandTransport {
    fn name(&self) -> &'static str {
        "command"
    }

    fn send(&self, notification: &Notification) -> Result<()> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .env("SRD_TITLE", notification.title.as_deref().unwrap_or_default())
            .env("SRD_MESSAGE", &notification.message)
            .env("SRD_URL", notification.url.as_deref().unwrap_or_default())
            .env("SRD_PRIORITY", notification.priority.as_str())
            .env("SRD_PRIORITY_LEVEL", notification.priority.level().to_string())
            .stdin(Stdio::null());
        let output = process::isolate(&mut cmd)
            .output()
            .map_err(|e| SrdError::Transport {
                transport: "command",
                details: format!("failed to spawn {}: {e}", self.config.program),
                retryable: false,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SrdError::Transport {
            transport: "command",
            details: format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                truncate_chars(stderr.trim(), 200)
            ),
            retryable: true,
        })
    }
}
