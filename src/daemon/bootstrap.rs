//! Startup: config → activity log → state → registry → transport → runner.
//!
//! Everything that can make the process refuse to start happens here, before
//! the first tick. Only configuration errors and state corruption are fatal.

#![allow(missing_docs)]

use std::path::Path;

use crate::core::config::{Config, TransportKind};
use crate::core::errors::{Result, SrdError};
use crate::dispatch::Dispatcher;
use crate::logger::ActivityLog;
use crate::notify::{self, LogTransport, Transport};
use crate::registry::{self, MonitorDescriptor, MonitorOptions, PluginRegistry};
use crate::state::{MemoryBackend, StateStore};

use super::loop_main::{MonitorSlot, Runner, RunnerSettings};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupOptions {
    /// Log notifications instead of sending them and keep state in memory.
    pub dry_run: bool,
}

/// A fully wired engine, ready to tick.
#[derive(Debug)]
pub struct Engine {
    pub config: Config,
    pub runner: Runner,
    pub log: ActivityLog,
}

impl Engine {
    /// Build with the activity log the config asks for.
    pub fn start(config: Config, options: StartupOptions) -> Result<Self> {
        let log = open_log(&config);
        Self::start_with_log(config, options, log)
    }

    pub fn start_with_log(
        mut config: Config,
        options: StartupOptions,
        log: ActivityLog,
    ) -> Result<Self> {
        if options.dry_run {
            config.notify.transport = TransportKind::Log;
        }
        config.validate()?;

        let store = open_store(&config.paths.state_file, options.dry_run)?;
        log.info(
            "state",
            "loaded",
            format!("path={} records={}", store.location().display(), store.len()),
        );

        let slots = enabled_slots(&config, &log);
        let transport: Box<dyn Transport> = if options.dry_run {
            Box::new(LogTransport::new(log.clone()))
        } else {
            notify::from_config(&config.notify, &log)
        };
        log.info(
            "daemon",
            "ready",
            format!(
                "transport={} dry_run={} monitors={}",
                transport.name(),
                options.dry_run,
                slots.len()
            ),
        );

        let dispatcher = Dispatcher::new(store, transport, log.clone());
        let settings = RunnerSettings {
            cadence: config.cadence(),
            jitter: config.jitter(),
        };
        let runner = Runner::new(slots, dispatcher, settings, log.clone());
        Ok(Self {
            config,
            runner,
            log,
        })
    }
}

/// Stderr plus the configured JSONL file. An unopenable file degrades to
/// stderr only.
#[must_use]
pub fn open_log(config: &Config) -> ActivityLog {
    let Some(path) = config.paths.activity_log.as_deref() else {
        return ActivityLog::stderr();
    };
    match ActivityLog::with_jsonl(path) {
        Ok(log) => log,
        Err(err) => {
            let log = ActivityLog::stderr();
            log.warn("logger", "jsonl_unavailable", err.to_string());
            log
        }
    }
}

/// Load the state file. In dry-run mode the current contents are copied into
/// memory so nothing is written back.
pub fn open_store(path: &Path, dry_run: bool) -> Result<StateStore> {
    if !dry_run {
        return StateStore::open(path);
    }
    let backend = match std::fs::read(path) {
        Ok(bytes) => MemoryBackend::with_bytes(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryBackend::new(),
        Err(e) => {
            return Err(SrdError::StateCorruption {
                path: path.to_path_buf(),
                details: format!("unreadable: {e}"),
            });
        }
    };
    StateStore::load(Box::new(backend))
}

/// Every monitor the registry can find, before enabled-list filtering.
#[must_use]
pub fn discover_all(config: &Config, log: &ActivityLog) -> Vec<MonitorDescriptor> {
    PluginRegistry::new(&config.paths.plugin_dir, log.clone())
        .with_default_timeout(config.monitor_timeout())
        .discover()
}

/// Enabled monitors in enabled-list order, paired with their options.
#[must_use]
pub fn enabled_slots(config: &Config, log: &ActivityLog) -> Vec<MonitorSlot> {
    let discovered = discover_all(config, log);
    registry::filter(discovered, &config.daemon.enabled_monitors, log)
        .into_iter()
        .map(|descriptor| {
            let options = config
                .monitors
                .get(&descriptor.id)
                .cloned()
                .map(MonitorOptions::new)
                .unwrap_or_default();
            MonitorSlot::new(descriptor, options)
        })
        .collect()
}
