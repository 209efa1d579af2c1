//! Shared harness for driving the built `srd` binary.
//!
//! Every case runs with an isolated `HOME` and a scrubbed environment, and
//! writes its full command output to a per-case log file so failures can be
//! inspected after the fact.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

const SCRUBBED_ENV: [&str; 8] = [
    "SRD_CONFIG",
    "ENABLED_MONITORS",
    "POLL_SECONDS",
    "STATE_FILE",
    "SRD_PLUGIN_DIR",
    "SRD_TRANSPORT",
    "PUSHOVER_USER_KEY",
    "PUSHOVER_API_TOKEN",
];

pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn log_dir() -> PathBuf {
    let dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("srd-cli-cases");
    std::fs::create_dir_all(&dir).expect("create case log dir");
    dir
}

/// Run with a fresh empty `HOME`.
pub fn run_cli_case(name: &str, args: &[&str]) -> CliResult {
    let home = tempfile::tempdir().expect("temp home");
    run_cli_case_with_env(name, args, &[("HOME", home.path().to_str().expect("utf8 home"))])
}

/// Run with explicit environment entries layered over the scrubbed base.
pub fn run_cli_case_with_env(name: &str, args: &[&str], env: &[(&str, &str)]) -> CliResult {
    let mut command = Command::new(env!("CARGO_BIN_EXE_srd"));
    command.args(args).env("NO_COLOR", "1");
    for key in SCRUBBED_ENV {
        command.env_remove(key);
    }
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("spawn srd");

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let log_path = log_dir().join(format!("{name}.log"));
    let mut log = String::new();
    let _ = writeln!(log, "args: {args:?}");
    let _ = writeln!(log, "status: {}", output.status);
    let _ = writeln!(log, "--- stdout ---\n{stdout}");
    let _ = writeln!(log, "--- stderr ---\n{stderr}");
    std::fs::write(&log_path, log).expect("write case log");

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// A temp workspace with a config file using the log transport.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new(extra_toml: &str) -> Self {
        let dir = tempfile::tempdir().expect("workspace");
        let root = dir.path();
        let config = format!(
            "[daemon]\n\
             enabled_monitors = [\"feed\"]\n\
             cadence_secs = 1\n\
             notify_on_start = false\n\n\
             [paths]\n\
             state_file = \"{state}\"\n\
             plugin_dir = \"{plugins}\"\n\n\
             [notify]\n\
             transport = \"log\"\n\n\
             [monitors.feed]\n\
             path = \"{feed}\"\n\n\
             {extra_toml}\n",
            state = root.join("state.json").display(),
            plugins = root.join("monitors").display(),
            feed = root.join("feed.jsonl").display(),
        );
        std::fs::write(root.join("config.toml"), config).expect("write config");
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config_path(&self) -> String {
        self.path("config.toml").display().to_string()
    }

    pub fn write_feed(&self, lines: &[&str]) {
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(self.path("feed.jsonl"), body).expect("write feed");
    }

    /// Run `srd --config <this workspace> args...` with `HOME` inside it.
    pub fn run(&self, name: &str, args: &[&str]) -> CliResult {
        let config = self.config_path();
        let mut full: Vec<&str> = vec!["--config", &config];
        full.extend_from_slice(args);
        let home = self.dir.path().to_str().expect("utf8 workspace");
        run_cli_case_with_env(name, &full, &[("HOME", home)])
    }
}
