//! Operator configuration: TOML file layered under environment overrides.
//!
//! Resolution order is defaults → config file → environment. The result is
//! loaded once at startup; there is no hot reload.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SrdError};

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG: &str = "SRD_CONFIG";
/// Comma-separated ordered list of enabled monitor ids.
pub const ENV_ENABLED_MONITORS: &str = "ENABLED_MONITORS";
/// Inter-tick delay in seconds.
pub const ENV_POLL_SECONDS: &str = "POLL_SECONDS";
pub const ENV_STATE_FILE: &str = "STATE_FILE";
pub const ENV_PLUGIN_DIR: &str = "SRD_PLUGIN_DIR";
pub const ENV_TRANSPORT: &str = "SRD_TRANSPORT";
pub const ENV_PUSHOVER_USER: &str = "PUSHOVER_USER_KEY";
pub const ENV_PUSHOVER_TOKEN: &str = "PUSHOVER_API_TOKEN";

/// Default Pushover message endpoint.
pub const PUSHOVER_ENDPOINT: &str = "https://api.pushover.net/1/messages.json";

/// Full daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub paths: PathsConfig,
    pub notify: NotifyConfig,
    /// Opaque per-monitor option bundles keyed by monitor id.
    pub monitors: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Ordered: controls polling order within a tick.
    pub enabled_monitors: Vec<String>,
    pub cadence_secs: u64,
    pub jitter_secs: u64,
    /// Hard timeout applied to exec plugins.
    pub monitor_timeout_secs: u64,
    pub notify_on_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_file: PathBuf,
    pub plugin_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Pushover,
    Command,
    Log,
}

impl TransportKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pushover" => Some(Self::Pushover),
            "command" => Some(Self::Command),
            "log" => Some(Self::Log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub transport: TransportKind,
    /// Total attempts per notification, including the first.
    pub retry_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub pushover: PushoverConfig,
    pub command: CommandConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushoverConfig {
    pub user_key: String,
    pub api_token: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled_monitors: vec!["heartbeat".to_string()],
            cadence_secs: 90,
            jitter_secs: 0,
            monitor_timeout_secs: 120,
            notify_on_start: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").ok();
        Self::for_home(home.as_deref())
    }
}

impl PathsConfig {
    /// Default layout under a home directory, or `/var/lib/srd` without one.
    #[must_use]
    pub fn for_home(home: Option<&str>) -> Self {
        match home {
            Some(home) if !home.is_empty() => {
                let home = Path::new(home);
                let data = home.join(".local/share/srd");
                Self {
                    state_file: data.join("state.json"),
                    plugin_dir: home.join(".config/srd/monitors"),
                    activity_log: Some(data.join("activity.jsonl")),
                }
            }
            _ => Self {
                state_file: PathBuf::from("/var/lib/srd/state.json"),
                plugin_dir: PathBuf::from("/etc/srd/monitors"),
                activity_log: Some(PathBuf::from("/var/lib/srd/activity.jsonl")),
            },
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            retry_attempts: 4,
            retry_initial_ms: 1_000,
            retry_max_ms: 20_000,
            pushover: PushoverConfig::default(),
            command: CommandConfig::default(),
        }
    }
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            user_key: String::new(),
            api_token: String::new(),
            endpoint: PUSHOVER_ENDPOINT.to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            paths: PathsConfig::default(),
            notify: NotifyConfig::default(),
            monitors: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Default config file location.
    #[must_use]
    pub fn default_path(home: Option<&str>) -> PathBuf {
        match home {
            Some(home) if !home.is_empty() => Path::new(home).join(".config/srd/config.toml"),
            _ => PathBuf::from("/etc/srd/config.toml"),
        }
    }

    /// Load from the process environment.
    ///
    /// An explicit path (argument or `SRD_CONFIG`) must exist; the implicit
    /// default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_env(explicit, |key| std::env::var(key).ok())
    }

    /// Load with an injectable environment lookup.
    pub fn load_with_env<F>(explicit: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME");
        let from_env = lookup(ENV_CONFIG).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        let explicit = explicit.map(Path::to_path_buf).or(from_env);

        let mut config = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(SrdError::MissingConfig { path });
                }
                Self::from_file(&path, home.as_deref())?
            }
            None => {
                let path = Self::default_path(home.as_deref());
                if path.is_file() {
                    Self::from_file(&path, home.as_deref())?
                } else {
                    Self {
                        paths: PathsConfig::for_home(home.as_deref()),
                        ..Self::default()
                    }
                }
            }
        };

        config.apply_env_overrides(lookup)?;
        Ok(config)
    }

    /// Parse a TOML file, expanding `~/` in path settings.
    pub fn from_file(path: &Path, home: Option<&str>) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SrdError::io(path, e))?;
        let mut config: Self = toml::from_str(&raw)?;
        config.paths.state_file = expand_home(&config.paths.state_file, home);
        config.paths.plugin_dir = expand_home(&config.paths.plugin_dir, home);
        config.paths.activity_log = config
            .paths
            .activity_log
            .as_deref()
            .map(|p| expand_home(p, home));
        Ok(config)
    }

    /// Apply environment overrides on top of file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_ENABLED_MONITORS) {
            self.daemon.enabled_monitors = parse_monitor_list(&raw);
        }
        if let Some(raw) = lookup(ENV_POLL_SECONDS) {
            self.daemon.cadence_secs =
                raw.trim()
                    .parse()
                    .map_err(|e| SrdError::ConfigParse {
                        context: "POLL_SECONDS",
                        details: format!("{raw:?}: {e}"),
                    })?;
        }
        if let Some(raw) = lookup(ENV_STATE_FILE).filter(|v| !v.trim().is_empty()) {
            self.paths.state_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup(ENV_PLUGIN_DIR).filter(|v| !v.trim().is_empty()) {
            self.paths.plugin_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup(ENV_TRANSPORT) {
            self.notify.transport =
                TransportKind::parse(&raw).ok_or_else(|| SrdError::ConfigParse {
                    context: "SRD_TRANSPORT",
                    details: format!("unknown transport {raw:?}"),
                })?;
        }
        if let Some(raw) = lookup(ENV_PUSHOVER_USER) {
            self.notify.pushover.user_key = raw.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_PUSHOVER_TOKEN) {
            self.notify.pushover.api_token = raw.trim().to_string();
        }
        Ok(())
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.cadence_secs == 0 {
            return Err(invalid("daemon.cadence_secs must be at least 1"));
        }
        if self.daemon.monitor_timeout_secs == 0 {
            return Err(invalid("daemon.monitor_timeout_secs must be at least 1"));
        }
        if self.notify.retry_attempts == 0 {
            return Err(invalid("notify.retry_attempts must be at least 1"));
        }
        match self.notify.transport {
            TransportKind::Pushover => {
                if self.notify.pushover.user_key.is_empty()
                    || self.notify.pushover.api_token.is_empty()
                {
                    return Err(invalid(
                        "pushover transport requires notify.pushover.user_key and api_token \
                         (or PUSHOVER_USER_KEY / PUSHOVER_API_TOKEN)",
                    ));
                }
            }
            TransportKind::Command => {
                if self.notify.command.program.trim().is_empty() {
                    return Err(invalid("command transport requires notify.command.program"));
                }
            }
            TransportKind::Log => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.daemon.cadence_secs)
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.daemon.jitter_secs)
    }

    #[must_use]
    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.monitor_timeout_secs)
    }

    /// Render as TOML for `srd config show`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SrdError::Serialization {
            context: "toml",
            details: e.to_string(),
        })
    }
}

fn invalid(details: &str) -> SrdError {
    SrdError::InvalidConfig {
        details: details.to_string(),
    }
}

/// Split a comma list, trimming blanks and dropping repeats while keeping order.
#[must_use]
pub fn parse_monitor_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|existing| existing == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Replace a leading `~` with `home`. Other paths pass through unchanged.
#[must_use]
pub fn expand_home(path: &Path, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) if !home.is_empty() => Path::new(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid_except_for_pushover_credentials() {
        let config = Config::default();
        assert_eq!(config.daemon.cadence_secs, 90);
        assert_eq!(config.notify.transport, TransportKind::Pushover);
        assert!(matches!(
            config.validate(),
            Err(SrdError::InvalidConfig { .. })
        ));

        let mut log_config = config;
        log_config.notify.transport = TransportKind::Log;
        assert!(log_config.validate().is_ok());
    }

    #[test]
    fn file_values_parse_and_expand_home() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[daemon]
enabled_monitors = ["feed", "heartbeat"]
cadence_secs = 30

[paths]
state_file = "~/state/srd.json"
plugin_dir = "/opt/srd/monitors"

[notify]
transport = "log"

[monitors.feed]
path = "/tmp/feed.jsonl"
max_items = 5
"#,
        )
        .unwrap();

        let config = Config::from_file(&path, Some("/home/op")).unwrap();
        assert_eq!(config.daemon.enabled_monitors, vec!["feed", "heartbeat"]);
        assert_eq!(config.cadence(), Duration::from_secs(30));
        assert_eq!(
            config.paths.state_file,
            PathBuf::from("/home/op/state/srd.json")
        );
        assert_eq!(config.paths.plugin_dir, PathBuf::from("/opt/srd/monitors"));
        assert_eq!(config.notify.transport, TransportKind::Log);
        assert_eq!(
            config.monitors["feed"].get("max_items"),
            Some(&toml::Value::Integer(5))
        );
        // Unspecified sections keep defaults.
        assert_eq!(config.notify.retry_attempts, 4);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                (ENV_ENABLED_MONITORS, " truth_social, heartbeat ,,truth_social"),
                (ENV_POLL_SECONDS, "45"),
                (ENV_STATE_FILE, "/tmp/s.json"),
                (ENV_TRANSPORT, "Command"),
                (ENV_PUSHOVER_USER, " u "),
            ]))
            .unwrap();
        assert_eq!(
            config.daemon.enabled_monitors,
            vec!["truth_social", "heartbeat"]
        );
        assert_eq!(config.daemon.cadence_secs, 45);
        assert_eq!(config.paths.state_file, PathBuf::from("/tmp/s.json"));
        assert_eq!(config.notify.transport, TransportKind::Command);
        assert_eq!(config.notify.pushover.user_key, "u");
    }

    #[test]
    fn bad_poll_seconds_is_a_parse_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[(ENV_POLL_SECONDS, "soon")]))
            .unwrap_err();
        assert_eq!(err.code(), "SRD-1003");
    }

    #[test]
    fn explicit_missing_file_is_reported() {
        let err = Config::load_with_env(Some(Path::new("/nonexistent/srd.toml")), env(&[]))
            .unwrap_err();
        assert!(matches!(err, SrdError::MissingConfig { .. }));
    }

    #[test]
    fn implicit_default_path_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_string_lossy().to_string();
        let config = Config::load_with_env(None, env(&[("HOME", home.as_str())])).unwrap();
        assert_eq!(
            config.paths.state_file,
            dir.path().join(".local/share/srd/state.json")
        );
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let mut config = Config::default();
        config.notify.transport = TransportKind::Log;
        config.daemon.cadence_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.monitors.insert("heartbeat".to_string(), toml::Table::new());
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
