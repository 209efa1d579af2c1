//! Candidate signals produced by monitors and the notifications derived from them.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Notification priority understood by every transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    /// Boosted delivery for actionable content.
    High,
}

impl Priority {
    /// Pushover-style numeric level (normal = 0, high = 1).
    #[must_use]
    pub const fn level(self) -> i8 {
        match self {
            Self::Normal => 0,
            Self::High => 1,
        }
    }

    /// Lowercase label used in logs and the command transport.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional severity hint a monitor may attach. Informational only: it never
/// changes the computed priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One unit of "interesting event" output by a monitor, pending novelty check.
///
/// Deserialization ignores unknown fields so exec plugins can emit extra data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSignal {
    /// Deterministic identity of the event across invocations.
    #[serde(alias = "key")]
    pub dedup_key: String,
    /// Human-readable body.
    #[serde(alias = "text")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Structured tags such as ticker symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Commit the key if it is novel, but send nothing. Monitors use this to
    /// seed history on their first run.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub record_only: bool,
}

impl CandidateSignal {
    #[must_use]
    pub fn new(dedup_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            dedup_key: dedup_key.into(),
            message: message.into(),
            title: None,
            url: None,
            tags: Vec::new(),
            severity: None,
            record_only: false,
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_record_only(mut self, record_only: bool) -> Self {
        self.record_only = record_only;
        self
    }
}

/// What a transport is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: Option<String>,
    pub message: String,
    pub url: Option<String>,
    pub priority: Priority,
}

impl Notification {
    #[must_use]
    pub fn new(message: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: None,
            message: message.into(),
            url: None,
            priority,
        }
    }

    /// Build the notification for a candidate signal at a computed priority.
    #[must_use]
    pub fn from_signal(signal: &CandidateSignal, priority: Priority) -> Self {
        Self {
            title: signal.title.clone(),
            message: signal.message.clone(),
            url: signal.url.clone(),
            priority,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
