//! Compiled-in monitors.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{Monitor, MonitorOptions};
use crate::core::config::expand_home;
use crate::core::errors::{Result, SrdError};
use crate::core::signal::{CandidateSignal, Severity};
use crate::logger::{ActivityEvent, ActivityLog, Level};

pub const MEDIA_ONLY_MESSAGE: &str = "Media-only post (no text). No trade signal.";

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));
static CASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z]{1,5})\b").expect("Invalid regex"));

/// Stock monitors, in registration order.
#[must_use]
pub fn defaults(log: &ActivityLog) -> Vec<Box<dyn Monitor>> {
    vec![
        Box::new(HeartbeatMonitor),
        Box::new(FeedMonitor::new(log.clone())),
    ]
}

// ──────────────────── heartbeat ────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatOptions {
    pub interval_secs: u64,
    pub message: Option<String>,
    pub title: String,
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            message: None,
            title: "Heartbeat".to_string(),
        }
    }
}

/// Emits one liveness signal per interval bucket; the store suppresses the
/// repeats inside a bucket.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor;

impl HeartbeatMonitor {
    /// Signal for the bucket containing `now`.
    #[must_use]
    pub fn signal_at(options: &HeartbeatOptions, now: DateTime<Utc>) -> CandidateSignal {
        let interval = options.interval_secs.max(1);
        let bucket = u64::try_from(now.timestamp()).unwrap_or(0) / interval;
        let message = options
            .message
            .clone()
            .unwrap_or_else(|| format!("Still alive (every {interval}s)."));
        CandidateSignal::new(format!("heartbeat-{bucket}"), message)
            .with_title(options.title.clone())
            .with_severity(Severity::Info)
    }
}

impl Monitor for HeartbeatMonitor {
    fn id(&self) -> &str {
        "heartbeat"
    }

    fn display_name(&self) -> &str {
        "Heartbeat"
    }

    fn poll(&mut self, options: &MonitorOptions) -> Result<Vec<CandidateSignal>> {
        let options: HeartbeatOptions = options.parse(self.id())?;
        Ok(vec![Self::signal_at(&options, Utc::now())])
    }
}

// ──────────────────── feed ────────────────────

/// What the feed does with existing entries when the store has no history
/// for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bootstrap {
    /// Record the backlog without sending; notify only the newest entry.
    #[default]
    Latest,
    /// Notify every entry in the window.
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedOptions {
    pub path: Option<PathBuf>,
    pub max_items: usize,
    pub extract_cashtags: bool,
    pub ticker_whitelist: Vec<String>,
    pub title: String,
    pub bootstrap: Bootstrap,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            path: None,
            max_items: 25,
            extract_cashtags: true,
            ticker_whitelist: Vec::new(),
            title: "New post".to_string(),
            bootstrap: Bootstrap::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "content")]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Reads a JSON-lines post feed written by some external collector.
///
/// Lines are appended oldest first; the newest `max_items` complete lines are
/// turned into signals in file order. A leading `~` in `path` is the home
/// directory. A missing file yields nothing and logs `feed_missing`.
#[derive(Debug)]
pub struct FeedMonitor {
    home: Option<String>,
    log: ActivityLog,
}

impl FeedMonitor {
    /// Feed monitor resolving `~` against `$HOME`.
    #[must_use]
    pub fn new(log: ActivityLog) -> Self {
        Self {
            home: std::env::var("HOME").ok(),
            log,
        }
    }

    #[must_use]
    pub fn with_home(mut self, home: Option<&str>) -> Self {
        self.home = home.map(ToString::to_string);
        self
    }
}

impl Monitor for FeedMonitor {
    fn id(&self) -> &str {
        "feed"
    }

    fn display_name(&self) -> &str {
        "Post feed"
    }

    fn poll(&mut self, options: &MonitorOptions) -> Result<Vec<CandidateSignal>> {
        let first_run = options.is_first_run();
        let options: FeedOptions = options.parse(self.id())?;
        let path = options
            .path
            .as_deref()
            .map(|path| expand_home(path, self.home.as_deref()))
            .ok_or_else(|| SrdError::monitor("feed", "option `path` is required"))?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.log.emit(
                    ActivityEvent::new(Level::Warn, "feed", "feed_missing")
                        .monitor(self.id())
                        .detail(format!("{} does not exist yet", path.display())),
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(SrdError::monitor(
                    "feed",
                    format!("cannot read {}: {e}", path.display()),
                ));
            }
        };
        let mut signals =
            parse_feed(&raw, &options).map_err(|details| SrdError::monitor("feed", details))?;
        if first_run && options.bootstrap == Bootstrap::Latest {
            seed_history(&mut signals);
        }
        Ok(signals)
    }
}

/// Mark every signal but the last (newest) as record-only.
pub fn seed_history(signals: &mut [CandidateSignal]) {
    if let Some((_, backlog)) = signals.split_last_mut() {
        for signal in backlog {
            signal.record_only = true;
        }
    }
}

/// Turn feed text into signals. A trailing line without a newline is still
/// being written and is left for the next poll.
pub fn parse_feed(raw: &str, options: &FeedOptions) -> std::result::Result<Vec<CandidateSignal>, String> {
    let complete = match raw.rfind('\n') {
        Some(end) => &raw[..=end],
        None => "",
    };
    let lines: Vec<(usize, &str)> = complete
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(options.max_items);

    let mut signals = Vec::new();
    for (idx, line) in &lines[start..] {
        let entry: FeedEntry = serde_json::from_str(line.trim())
            .map_err(|e| format!("invalid feed line {}: {e}", idx + 1))?;
        if let Some(signal) = entry_signal(entry, options) {
            signals.push(signal);
        }
    }
    Ok(signals)
}

fn entry_signal(entry: FeedEntry, options: &FeedOptions) -> Option<CandidateSignal> {
    let text = entry.text.as_deref().map(clean_text).unwrap_or_default();
    let id = entry.id.as_ref().and_then(id_string);
    let url = entry.url.filter(|url| !url.trim().is_empty());

    let dedup_key = match (&id, &url) {
        (Some(id), _) => id.clone(),
        (None, _) if !text.is_empty() => sha256_hex(&text),
        (None, Some(url)) => sha256_hex(url),
        (None, None) => return None,
    };

    let tags = match entry.tags {
        Some(tags) => tags,
        None if options.extract_cashtags => cashtags(&text, &options.ticker_whitelist),
        None => Vec::new(),
    };
    let message = if text.is_empty() {
        MEDIA_ONLY_MESSAGE.to_string()
    } else {
        text
    };

    let mut signal = CandidateSignal::new(dedup_key, message)
        .with_title(options.title.clone())
        .with_tags(tags);
    if let Some(url) = url {
        signal = signal.with_url(url);
    }
    Some(signal)
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Strip HTML tags and collapse runs of whitespace.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    let stripped = HTML_TAG.replace_all(raw, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Uppercased `$TICKER` mentions in first-seen order, optionally restricted
/// to a case-insensitive whitelist.
#[must_use]
pub fn cashtags(text: &str, whitelist: &[String]) -> Vec<String> {
    let allowed: HashSet<String> = whitelist.iter().map(|t| t.to_uppercase()).collect();
    let mut seen = HashSet::new();
    CASHTAG
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
        .filter(|tag| allowed.is_empty() || allowed.contains(tag))
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
