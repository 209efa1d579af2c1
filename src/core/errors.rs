//! SRD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SrdError>;

/// Top-level error type for the signal relay daemon.
#[derive(Debug, Error)]
pub enum SrdError {
    #[error("[SRD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SRD-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SRD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SRD-2001] plugin load failure for {path}: {details}")]
    PluginLoad { path: PathBuf, details: String },

    #[error("[SRD-2101] monitor {monitor} failed: {details}")]
    MonitorInvocation { monitor: String, details: String },

    #[error("[SRD-2102] monitor {monitor} timed out after {}s", timeout.as_secs())]
    MonitorTimeout { monitor: String, timeout: Duration },

    #[error("[SRD-2201] notification transport {transport} failed: {details}")]
    Transport {
        transport: &'static str,
        details: String,
        retryable: bool,
    },

    #[error("[SRD-2301] state file {path} is corrupt: {details}")]
    StateCorruption { path: PathBuf, details: String },

    #[error("[SRD-2302] state file {path} could not be persisted: {details}")]
    StatePersistence { path: PathBuf, details: String },

    #[error("[SRD-2401] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SRD-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SRD-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SRD-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SrdError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SRD-1001",
            Self::MissingConfig { .. } => "SRD-1002",
            Self::ConfigParse { .. } => "SRD-1003",
            Self::PluginLoad { .. } => "SRD-2001",
            Self::MonitorInvocation { .. } => "SRD-2101",
            Self::MonitorTimeout { .. } => "SRD-2102",
            Self::Transport { .. } => "SRD-2201",
            Self::StateCorruption { .. } => "SRD-2301",
            Self::StatePersistence { .. } => "SRD-2302",
            Self::Serialization { .. } => "SRD-2401",
            Self::Io { .. } => "SRD-3002",
            Self::ChannelClosed { .. } => "SRD-3003",
            Self::Runtime { .. } => "SRD-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Io { .. }
            | Self::MonitorTimeout { .. }
            | Self::StatePersistence { .. }
            | Self::Runtime { .. } => true,
            _ => false,
        }
    }

    /// Whether the failure must stop the daemon from starting.
    #[must_use]
    pub const fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::StateCorruption { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for monitor failures.
    #[must_use]
    pub fn monitor(monitor: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MonitorInvocation {
            monitor: monitor.into(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for SrdError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SrdError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
