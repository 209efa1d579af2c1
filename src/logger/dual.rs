//! Activity log shared by every component.
//!
//! Each event goes to stderr as one human-readable line and, when configured,
//! to the JSONL sink. A capture mode keeps events in memory for tests.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::jsonl::JsonlWriter;
use crate::core::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// One structured activity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    pub component: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl ActivityEvent {
    #[must_use]
    pub fn new(level: Level, component: &str, event: &str) -> Self {
        Self {
            ts: Utc::now(),
            level,
            component: component.to_string(),
            event: event.to_string(),
            monitor: None,
            dedup_key: None,
            detail: String::new(),
        }
    }

    #[must_use]
    pub fn monitor(mut self, monitor: &str) -> Self {
        self.monitor = Some(monitor.to_string());
        self
    }

    #[must_use]
    pub fn key(mut self, dedup_key: &str) -> Self {
        self.dedup_key = Some(dedup_key.to_string());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// `[srd] LEVEL component: event monitor=… key=… detail`
    #[must_use]
    pub fn render_line(&self) -> String {
        let mut line = format!(
            "[srd] {} {}: {}",
            self.level.label(),
            self.component,
            self.event
        );
        if let Some(monitor) = &self.monitor {
            let _ = write!(line, " monitor={monitor}");
        }
        if let Some(key) = &self.dedup_key {
            let _ = write!(line, " key={key}");
        }
        if !self.detail.is_empty() {
            let _ = write!(line, " {}", self.detail);
        }
        line
    }
}

#[derive(Debug, Default)]
struct Sinks {
    stderr: bool,
    jsonl: Option<JsonlWriter>,
    captured: Option<Vec<ActivityEvent>>,
}

/// Cheap-to-clone handle to the process activity log.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    sinks: Arc<Mutex<Sinks>>,
}

impl ActivityLog {
    fn from_sinks(sinks: Sinks) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
        }
    }

    /// Stderr only.
    #[must_use]
    pub fn stderr() -> Self {
        Self::from_sinks(Sinks {
            stderr: true,
            ..Sinks::default()
        })
    }

    /// Stderr plus an append-only JSONL file.
    pub fn with_jsonl(path: &Path) -> Result<Self> {
        Ok(Self::from_sinks(Sinks {
            stderr: true,
            jsonl: Some(JsonlWriter::open(path)?),
            captured: None,
        }))
    }

    /// In-memory only; see [`ActivityLog::events`].
    #[must_use]
    pub fn capture() -> Self {
        Self::from_sinks(Sinks {
            captured: Some(Vec::new()),
            ..Sinks::default()
        })
    }

    pub fn emit(&self, event: ActivityEvent) {
        let mut sinks = self.sinks.lock();
        if sinks.stderr {
            eprintln!("{}", event.render_line());
        }
        if let Some(writer) = sinks.jsonl.as_mut() {
            if let Some(err) = writer.append(&event) {
                eprintln!("[srd] WARN logger: jsonl sink disabled: {err}");
            }
        }
        if let Some(captured) = sinks.captured.as_mut() {
            captured.push(event);
        }
    }

    pub fn info(&self, component: &str, event: &str, detail: impl Into<String>) {
        self.emit(ActivityEvent::new(Level::Info, component, event).detail(detail));
    }

    pub fn warn(&self, component: &str, event: &str, detail: impl Into<String>) {
        self.emit(ActivityEvent::new(Level::Warn, component, event).detail(detail));
    }

    pub fn error(&self, component: &str, event: &str, detail: impl Into<String>) {
        self.emit(ActivityEvent::new(Level::Error, component, event).detail(detail));
    }

    /// Captured events (empty unless built with [`ActivityLog::capture`]).
    #[must_use]
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.sinks.lock().captured.clone().unwrap_or_default()
    }

    /// Captured events with the given name.
    #[must_use]
    pub fn events_named(&self, event: &str) -> Vec<ActivityEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }
}
