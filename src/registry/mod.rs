//! Plugin registry: the `Monitor` capability, discovery, and enabled-list filtering.
//!
//! Monitors come from two places: compiled-in implementations registered on
//! the [`PluginRegistry`], and exec plugins described by `*.toml` manifests in
//! the operator's plugin directory. Conformance (an invocable entry point and
//! a display name) is checked once here, at startup; a candidate that fails is
//! skipped with a warning.

pub mod builtin;
pub mod exec;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::core::errors::{Result, SrdError};
use crate::core::signal::CandidateSignal;
use crate::logger::{ActivityEvent, ActivityLog, Level};

/// A pluggable unit that polls some source and yields candidate signals.
///
/// Implementations may keep internal state between polls; the runner treats
/// each call as independent.
pub trait Monitor: Send {
    /// Stable internal identifier, matched against the enabled list.
    fn id(&self) -> &str;

    /// Human-readable name for logs and the startup notification.
    fn display_name(&self) -> &str;

    /// Produce this tick's candidate signals, in the order they should be
    /// dispatched.
    ///
    /// Report failures as `Err`: the runner logs them and moves on to the
    /// next monitor. A panic is not contained. Release builds use
    /// `panic = "abort"`, so a panicking monitor takes the whole daemon down.
    fn poll(&mut self, options: &MonitorOptions) -> Result<Vec<CandidateSignal>>;
}

/// Opaque per-monitor option bundle from `[monitors.<id>]`.
///
/// Each monitor turns it into its own typed options record via
/// [`MonitorOptions::parse`]. The runner also sets a first-run flag before
/// every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorOptions {
    table: toml::Table,
    first_run: bool,
}

impl MonitorOptions {
    #[must_use]
    pub fn new(table: toml::Table) -> Self {
        Self {
            table,
            first_run: false,
        }
    }

    #[must_use]
    pub fn with_first_run(mut self, first_run: bool) -> Self {
        self.first_run = first_run;
        self
    }

    pub fn set_first_run(&mut self, first_run: bool) {
        self.first_run = first_run;
    }

    /// True when the state store holds no records for this monitor yet.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    #[must_use]
    pub fn as_table(&self) -> &toml::Table {
        &self.table
    }

    /// Deserialize into a monitor-specific options struct.
    pub fn parse<T: DeserializeOwned>(&self, monitor: &str) -> Result<T> {
        toml::Value::Table(self.table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| {
                SrdError::monitor(monitor, format!("invalid options: {}", e.message()))
            })
    }

    /// JSON form handed to exec plugins.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.table)?)
    }
}

impl From<toml::Table> for MonitorOptions {
    fn from(table: toml::Table) -> Self {
        Self::new(table)
    }
}

/// Where a monitor was discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOrigin {
    Builtin,
    Exec { manifest: PathBuf },
}

impl fmt::Display for MonitorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("builtin"),
            Self::Exec { manifest } => write!(f, "exec:{}", manifest.display()),
        }
    }
}

/// A validated, invocable monitor.
pub struct MonitorDescriptor {
    pub id: String,
    pub display_name: String,
    pub origin: MonitorOrigin,
    pub monitor: Box<dyn Monitor>,
}

impl fmt::Debug for MonitorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl MonitorDescriptor {
    /// Check the monitor's identity and wrap it.
    pub fn validated(monitor: Box<dyn Monitor>, origin: MonitorOrigin) -> Result<Self> {
        let id = monitor.id().trim().to_string();
        let display_name = monitor.display_name().trim().to_string();
        let path = match &origin {
            MonitorOrigin::Builtin => PathBuf::from(format!("builtin:{id}")),
            MonitorOrigin::Exec { manifest } => manifest.clone(),
        };
        if id.is_empty() || id.contains(',') || id.chars().any(char::is_whitespace) {
            return Err(SrdError::PluginLoad {
                path,
                details: format!("invalid monitor id {id:?}"),
            });
        }
        if display_name.is_empty() {
            return Err(SrdError::PluginLoad {
                path,
                details: "missing display name".to_string(),
            });
        }
        Ok(Self {
            id,
            display_name,
            origin,
            monitor,
        })
    }
}

/// Discovers monitors once at startup.
pub struct PluginRegistry {
    plugin_dir: PathBuf,
    default_timeout: Duration,
    builtins: Vec<Box<dyn Monitor>>,
    log: ActivityLog,
}

impl PluginRegistry {
    /// Registry with the stock built-in monitors.
    #[must_use]
    pub fn new(plugin_dir: impl Into<PathBuf>, log: ActivityLog) -> Self {
        let builtins = builtin::defaults(&log);
        let mut registry = Self::empty(plugin_dir, log);
        for monitor in builtins {
            registry = registry.register(monitor);
        }
        registry
    }

    /// Registry with no built-ins.
    #[must_use]
    pub fn empty(plugin_dir: impl Into<PathBuf>, log: ActivityLog) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            default_timeout: Duration::from_secs(120),
            builtins: Vec::new(),
            log,
        }
    }

    /// Timeout for exec plugins whose manifest does not set one.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Add a compiled-in monitor.
    #[must_use]
    pub fn register(mut self, monitor: Box<dyn Monitor>) -> Self {
        self.builtins.push(monitor);
        self
    }

    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Built-ins in registration order, then exec plugins by manifest name.
    ///
    /// Candidates failing validation, and later duplicates of an id, are
    /// logged and skipped.
    pub fn discover(self) -> Vec<MonitorDescriptor> {
        let Self {
            plugin_dir,
            default_timeout,
            builtins,
            log,
        } = self;

        let mut candidates: Vec<Result<MonitorDescriptor>> = builtins
            .into_iter()
            .map(|monitor| MonitorDescriptor::validated(monitor, MonitorOrigin::Builtin))
            .collect();

        match exec::manifest_paths(&plugin_dir) {
            Ok(paths) => {
                for manifest in paths {
                    candidates.push(exec::load(&manifest, &plugin_dir, default_timeout).and_then(
                        |monitor| {
                            MonitorDescriptor::validated(
                                Box::new(monitor),
                                MonitorOrigin::Exec { manifest },
                            )
                        },
                    ));
                }
            }
            Err(err) => log.warn(
                "registry",
                "plugin_dir_unreadable",
                format!("{}: {err}", plugin_dir.display()),
            ),
        }

        let mut seen = HashSet::new();
        let mut discovered = Vec::new();
        for candidate in candidates {
            match candidate {
                Ok(descriptor) => {
                    if seen.insert(descriptor.id.clone()) {
                        discovered.push(descriptor);
                    } else {
                        log.emit(
                            ActivityEvent::new(Level::Warn, "registry", "plugin_skipped")
                                .monitor(&descriptor.id)
                                .detail(format!(
                                    "duplicate id from {}; keeping the first",
                                    descriptor.origin
                                )),
                        );
                    }
                }
                Err(err) => log.warn("registry", "plugin_skipped", err.to_string()),
            }
        }

        log.info(
            "registry",
            "discovered",
            format!(
                "monitors=[{}]",
                discovered
                    .iter()
                    .map(|d| d.id.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        );
        discovered
    }
}

/// Keep only enabled monitors, ordered as the enabled list orders them.
///
/// Unknown names are reported and ignored.
pub fn filter(
    discovered: Vec<MonitorDescriptor>,
    enabled: &[String],
    log: &ActivityLog,
) -> Vec<MonitorDescriptor> {
    let mut pool: Vec<Option<MonitorDescriptor>> = discovered.into_iter().map(Some).collect();
    let mut selected = Vec::new();
    for name in enabled {
        let slot = pool
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|d| &d.id == name));
        match slot.and_then(Option::take) {
            Some(descriptor) => selected.push(descriptor),
            None => log.emit(
                ActivityEvent::new(Level::Warn, "registry", "unknown_monitor")
                    .monitor(name)
                    .detail("enabled but not discovered (or listed twice)"),
            ),
        }
    }
    selected
}
