//! Top-level CLI definition and dispatch.

use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{Result, SrdError};
use crate::daemon::bootstrap::{self, Engine, StartupOptions};
use crate::daemon::{ShutdownHandle, TickReport, signals};
use crate::logger::ActivityLog;
use crate::state::{NotificationRecord, StateStore};

/// Signal relay: polls monitor plugins and pushes novel signals as notifications.
#[derive(Debug, Parser)]
#[command(name = "srd", version, about)]
pub struct Cli {
    /// Config file (default: ~/.config/srd/config.toml, or $SRD_CONFIG).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Machine-readable JSON output.
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the polling loop in the foreground until SIGINT/SIGTERM.
    Daemon {
        /// Log notifications instead of sending them; never write state.
        #[arg(long)]
        dry_run: bool,
        /// Stop after this many ticks.
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
    },
    /// Run exactly one tick and print its report.
    Once {
        /// Log notifications instead of sending them; never write state.
        #[arg(long)]
        dry_run: bool,
    },
    /// List discovered monitors and whether they are enabled.
    Monitors,
    /// Inspect or maintain the dedup state file.
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
    /// Show the effective configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum StateCommand {
    /// List notification records.
    Show {
        /// Only this monitor's records.
        #[arg(long, value_name = "ID")]
        monitor: Option<String>,
    },
    /// Validate the state file; exits non-zero if it is corrupt.
    Check,
    /// Drop records older than N days. Stop the daemon first.
    Prune {
        #[arg(long, value_name = "N")]
        older_than_days: u32,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the merged configuration as TOML.
    Show,
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "srd", &mut io::stdout());
            Ok(())
        }
        Command::Daemon { dry_run, max_ticks } => {
            run_daemon(&load_config(cli)?, *dry_run, *max_ticks)
        }
        Command::Once { dry_run } => run_once(&load_config(cli)?, *dry_run, cli.json),
        Command::Monitors => list_monitors(&load_config(cli)?, cli.json),
        Command::State { command } => run_state(&load_config(cli)?, command, cli.json),
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            let config = load_config(cli)?;
            if cli.json {
                print_json(&config)
            } else {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(cli.config.as_deref())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ──────────────────── daemon / once ────────────────────

fn run_daemon(config: &Config, dry_run: bool, max_ticks: Option<u64>) -> Result<()> {
    let mut engine = Engine::start(config.clone(), StartupOptions { dry_run })?;
    let shutdown = ShutdownHandle::new();
    let _signal_thread = signals::install(&shutdown, &engine.log)?;

    if engine.config.daemon.notify_on_start && !dry_run {
        engine.runner.announce_start();
    }
    let summary = engine.runner.run(&shutdown, max_ticks);
    engine.log.info(
        "daemon",
        "exit",
        format!("ticks={} notified={}", summary.ticks, summary.notified),
    );
    Ok(())
}

fn run_once(config: &Config, dry_run: bool, json: bool) -> Result<()> {
    let mut engine = Engine::start(config.clone(), StartupOptions { dry_run })?;
    let report = engine.runner.run_tick();
    if json {
        print_json(&report)
    } else {
        print!("{}", format_tick_report(&report));
        Ok(())
    }
}

/// Human-readable tick report.
#[must_use]
pub fn format_tick_report(report: &TickReport) -> String {
    let mut out = String::new();
    let status = if report.monitors_failed > 0 || report.not_recorded > 0 {
        "[WARN]".yellow().bold()
    } else {
        "[ OK ]".green().bold()
    };
    let _ = writeln!(
        out,
        "{status} tick {} finished in {} ms",
        report.tick, report.elapsed_ms
    );
    let _ = writeln!(
        out,
        "  monitors   {} run, {} failed",
        report.monitors_run, report.monitors_failed
    );
    let _ = writeln!(
        out,
        "  signals    {} seen, {} rejected",
        report.signals, report.rejected
    );
    let _ = writeln!(
        out,
        "  notified   {} ({} high priority)",
        report.notified, report.notified_high
    );
    if report.recorded > 0 {
        let _ = writeln!(out, "  recorded   {} (history, not sent)", report.recorded);
    }
    let _ = writeln!(out, "  suppressed {}", report.suppressed);
    if report.not_sent > 0 {
        let _ = writeln!(out, "  not sent   {}", report.not_sent.to_string().yellow());
    }
    if report.not_recorded > 0 {
        let _ = writeln!(
            out,
            "  {} {}",
            "SENT BUT NOT RECORDED".red().bold(),
            report.not_recorded
        );
    }
    out
}

// ──────────────────── monitors ────────────────────

#[derive(Debug, Serialize)]
struct MonitorRow {
    id: String,
    display_name: String,
    origin: String,
    enabled: bool,
}

fn list_monitors(config: &Config, json: bool) -> Result<()> {
    let log = ActivityLog::stderr();
    let enabled = &config.daemon.enabled_monitors;
    let rows: Vec<MonitorRow> = bootstrap::discover_all(config, &log)
        .into_iter()
        .map(|d| MonitorRow {
            enabled: enabled.contains(&d.id),
            id: d.id,
            display_name: d.display_name,
            origin: d.origin.to_string(),
        })
        .collect();
    let unknown: Vec<&String> = enabled
        .iter()
        .filter(|name| !rows.iter().any(|row| &row.id == *name))
        .collect();

    if json {
        return print_json(&serde_json::json!({
            "plugin_dir": config.paths.plugin_dir,
            "monitors": rows,
            "unknown_enabled": unknown,
        }));
    }

    println!(
        "{} (plugin dir: {})",
        "Monitors".bold(),
        config.paths.plugin_dir.display()
    );
    for row in &rows {
        let mark = if row.enabled {
            "enabled ".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {mark}  {:<16} {:<28} {}",
            row.id, row.display_name, row.origin
        );
    }
    for name in unknown {
        println!("  {}  {name:<16} enabled but not discovered", "unknown ".red());
    }
    Ok(())
}

// ──────────────────── state ────────────────────

fn run_state(config: &Config, command: &StateCommand, json: bool) -> Result<()> {
    let path = &config.paths.state_file;
    match command {
        StateCommand::Show { monitor } => {
            let store = StateStore::open(path)?;
            let records = store.records(monitor.as_deref());
            if json {
                return print_json(&records);
            }
            print!("{}", format_records(&records));
            Ok(())
        }
        StateCommand::Check => {
            let store = StateStore::open(path)?;
            let monitors = store.snapshot().monitors.len();
            if json {
                return print_json(&serde_json::json!({
                    "path": path,
                    "exists": path.exists(),
                    "records": store.len(),
                    "monitors": monitors,
                }));
            }
            println!(
                "{} {} ({} records across {monitors} monitors)",
                "[ OK ]".green().bold(),
                path.display(),
                store.len()
            );
            Ok(())
        }
        StateCommand::Prune { older_than_days } => {
            let age = TimeDelta::try_days(i64::from(*older_than_days)).ok_or_else(|| {
                SrdError::Runtime {
                    details: format!("--older-than-days {older_than_days} is out of range"),
                }
            })?;
            let mut store = StateStore::open(path)?;
            let removed = store.prune_before(Utc::now() - age)?;
            if json {
                return print_json(&serde_json::json!({
                    "removed": removed,
                    "remaining": store.len(),
                }));
            }
            println!(
                "Pruned {removed} record(s) older than {older_than_days} day(s); {} remain.",
                store.len()
            );
            Ok(())
        }
    }
}

fn format_records(records: &[NotificationRecord]) -> String {
    if records.is_empty() {
        return "No notification records.\n".to_string();
    }
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{}  {:<16} {}",
            record.notified_at.format("%Y-%m-%d %H:%M:%S"),
            record.monitor_id,
            record.dedup_key
        );
    }
    let _ = writeln!(out, "{} record(s)", records.len());
    out
}
