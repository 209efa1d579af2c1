//! Exec plugins: external programs described by a TOML manifest.
//!
//! Manifest (`<plugin_dir>/<name>.toml`):
//!
//! ```toml
//! id = "truth_social"          # optional, defaults to the file stem
//! display_name = "Truth Social (@someone)"
//! command = "truth_social.py"  # relative to the plugin dir, or absolute
//! args = ["--handle", "someone"]
//! timeout_secs = 60            # optional, defaults to the daemon setting
//! ```
//!
//! Protocol: the program receives `{"monitor": id, "first_run": bool,
//! "options": {...}}` on stdin and prints its signals on stdout, either as one
//! JSON array or as one JSON object per line. A non-zero exit status is a
//! monitor failure.
//!
//! Each program runs in its own process group. The timeout covers the exit
//! and the closing of its output pipes; past it the whole group is killed, so
//! a backgrounded child still holding stdout cannot stall the runner.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Deserialize;

use super::{Monitor, MonitorOptions};
use crate::core::errors::{Result, SrdError};
use crate::core::process;
use crate::core::signal::CandidateSignal;
use crate::notify::truncate_chars;

const WAIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, Deserialize)]
struct Manifest {
    id: Option<String>,
    display_name: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// A validated exec plugin.
#[derive(Debug, Clone)]
pub struct ExecMonitor {
    id: String,
    display_name: String,
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    workdir: PathBuf,
    timeout: Duration,
}

/// Manifest files in the plugin dir, sorted by name. A missing dir is empty.
pub fn manifest_paths(plugin_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(plugin_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SrdError::io(plugin_dir, e)),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Parse and validate one manifest.
pub fn load(manifest_path: &Path, plugin_dir: &Path, default_timeout: Duration) -> Result<ExecMonitor> {
    let fail = |details: String| SrdError::PluginLoad {
        path: manifest_path.to_path_buf(),
        details,
    };

    let raw = std::fs::read_to_string(manifest_path).map_err(|e| fail(e.to_string()))?;
    let manifest: Manifest = toml::from_str(&raw).map_err(|e| fail(e.message().to_string()))?;

    let display_name = manifest
        .display_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| fail("missing display_name".to_string()))?;
    let command = manifest
        .command
        .filter(|cmd| !cmd.trim().is_empty())
        .ok_or_else(|| fail("missing command entry point".to_string()))?;

    let program = resolve_program(&command, plugin_dir);
    if !program.is_file() {
        return Err(fail(format!("command {} not found", program.display())));
    }
    if !is_executable(&program) {
        return Err(fail(format!("command {} is not executable", program.display())));
    }

    let id = manifest.id.unwrap_or_else(|| {
        manifest_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    Ok(ExecMonitor {
        id,
        display_name,
        program,
        args: manifest.args,
        env: manifest.env,
        workdir: plugin_dir.to_path_buf(),
        timeout: manifest
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map_or(default_timeout, Duration::from_secs),
    })
}

fn resolve_program(command: &str, plugin_dir: &Path) -> PathBuf {
    let path = Path::new(command);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        plugin_dir.join(path)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

impl ExecMonitor {
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn spawn(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        process::isolate(&mut cmd)
            .spawn()
            .map_err(|e| SrdError::monitor(&self.id, format!("spawn failed: {e}")))
    }

    /// Wait for the child to exit, giving up at `deadline`.
    fn wait_until(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => return Err(self.abandon(child)),
                Ok(None) => thread::sleep(WAIT_POLL),
                Err(e) => {
                    process::kill_group(child);
                    return Err(SrdError::monitor(&self.id, format!("wait failed: {e}")));
                }
            }
        }
    }

    /// Bytes from one drain thread. A pipe still open at `deadline` counts
    /// as a timeout.
    fn collect(
        &self,
        child: &mut Child,
        output: &Receiver<Vec<u8>>,
        deadline: Instant,
    ) -> Result<Vec<u8>> {
        match output.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(bytes) => Ok(bytes),
            Err(RecvTimeoutError::Timeout) => Err(self.abandon(child)),
            Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        }
    }

    fn abandon(&self, child: &mut Child) -> SrdError {
        process::kill_group(child);
        SrdError::MonitorTimeout {
            monitor: self.id.clone(),
            timeout: self.timeout,
        }
    }
}

/// Write the request from a helper thread so a plugin that never reads stdin
/// cannot hold the caller past its deadline.
fn feed(sink: Option<ChildStdin>, request: Vec<u8>) {
    if let Some(mut sink) = sink {
        thread::spawn(move || {
            // A plugin that ignores stdin may close it early; that is fine.
            let _ = sink.write_all(&request);
        });
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

impl Monitor for ExecMonitor {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn poll(&mut self, options: &MonitorOptions) -> Result<Vec<CandidateSignal>> {
        let request = serde_json::json!({
            "monitor": self.id,
            "first_run": options.is_first_run(),
            "options": options.to_json()?,
        });

        let deadline = Instant::now() + self.timeout;
        let mut child = self.spawn()?;
        feed(child.stdin.take(), request.to_string().into_bytes());
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_until(&mut child, deadline)?;
        let out = self.collect(&mut child, &stdout, deadline)?;
        let err = self.collect(&mut child, &stderr, deadline)?;

        if !status.success() {
            let err = String::from_utf8_lossy(&err);
            return Err(SrdError::monitor(
                &self.id,
                format!("exited with {status}: {}", truncate_chars(err.trim(), 300)),
            ));
        }

        parse_signals(&String::from_utf8_lossy(&out))
            .map_err(|details| SrdError::monitor(&self.id, details))
    }
}

/// Accept a JSON array or JSON lines. Empty output means no signals.
pub fn parse_signals(stdout: &str) -> std::result::Result<Vec<CandidateSignal>, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| format!("invalid signal array: {e}"));
    }
    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim())
                .map_err(|e| format!("invalid signal on output line {}: {e}", idx + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_and_lines() {
        let array = parse_signals(r#"[{"dedup_key":"a","message":"x"},{"key":"b","text":"y"}]"#)
            .unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[1].dedup_key, "b");

        let lines = parse_signals("{\"dedup_key\":\"a\",\"message\":\"x\",\"tags\":[\"TSLA\"]}\n\n{\"dedup_key\":\"b\",\"message\":\"y\"}\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tags, vec!["TSLA".to_string()]);

        assert!(parse_signals("  \n").unwrap().is_empty());
        let err = parse_signals("{\"dedup_key\":\"a\",\"message\":\"x\"}\nnot json").unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn manifest_missing_display_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("nameless.toml");
        std::fs::write(&manifest, "command = \"/bin/sh\"\n").unwrap();
        let err = load(&manifest, dir.path(), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SrdError::PluginLoad { .. }));
        assert!(err.to_string().contains("display_name"));
    }

    #[test]
    fn manifest_missing_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("idle.toml");
        std::fs::write(&manifest, "display_name = \"Idle\"\n").unwrap();
        let err = load(&manifest, dir.path(), Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("entry point"));
    }

    #[test]
    fn manifest_paths_ignore_other_files_and_sort() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.toml", "a.toml", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<String> = manifest_paths(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.toml"]);
        assert!(manifest_paths(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn manifest(dir: &Path, name: &str, body: &str) -> ExecMonitor {
        let path = dir.join(format!("{name}.toml"));
        std::fs::write(&path, body).unwrap();
        load(&path, dir, Duration::from_secs(5)).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plain.sh"), "echo hi").unwrap();
        let path = dir.path().join("plain.toml");
        std::fs::write(&path, "display_name = \"Plain\"\ncommand = \"plain.sh\"\n").unwrap();
        let err = load(&path, dir.path(), Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("not executable"));
    }

    #[cfg(unix)]
    #[test]
    fn exec_plugin_receives_options_and_returns_signals() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "echo.sh",
            r#"input=$(cat)
case "$input" in
  *'"handle":"someone"'*) echo '{"dedup_key":"post-1","message":"hello","tags":["AAPL"]}' ;;
  *) echo '{"dedup_key":"wrong","message":"options missing"}' ;;
esac"#,
        );
        let mut monitor = manifest(
            dir.path(),
            "echo",
            "display_name = \"Echo\"\ncommand = \"echo.sh\"\n",
        );
        assert_eq!(monitor.id(), "echo");

        let table: toml::Table = toml::from_str("handle = \"someone\"").unwrap();
        let signals = monitor.poll(&MonitorOptions::new(table)).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].dedup_key, "post-1");
        assert_eq!(signals[0].tags, vec!["AAPL".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn exec_plugin_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "fail.sh", "echo 'rate-limit: 429' >&2\nexit 2");
        let mut monitor = manifest(
            dir.path(),
            "fail",
            "id = \"flaky\"\ndisplay_name = \"Flaky\"\ncommand = \"fail.sh\"\n",
        );
        let err = monitor.poll(&MonitorOptions::default()).unwrap_err();
        assert_eq!(err.code(), "SRD-2101");
        assert!(err.to_string().contains("rate-limit: 429"));
        assert!(err.to_string().contains("flaky"));
    }

    #[cfg(unix)]
    #[test]
    fn hung_plugin_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "hang.sh", "exec sleep 30");
        let mut monitor = manifest(
            dir.path(),
            "hang",
            "display_name = \"Hang\"\ncommand = \"hang.sh\"\ntimeout_secs = 1\n",
        );
        let started = Instant::now();
        let err = monitor.poll(&MonitorOptions::default()).unwrap_err();
        assert!(matches!(err, SrdError::MonitorTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn backgrounded_child_holding_stdout_cannot_outlast_timeout() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "straggler.sh",
            "(sleep 2; touch straggler-survived) &\necho '[]'",
        );
        let mut monitor = manifest(
            dir.path(),
            "straggler",
            "display_name = \"Straggler\"\ncommand = \"straggler.sh\"\ntimeout_secs = 1\n",
        );
        let started = Instant::now();
        let err = monitor.poll(&MonitorOptions::default()).unwrap_err();
        assert!(matches!(err, SrdError::MonitorTimeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(1900));

        // The whole group went down with it.
        thread::sleep(Duration::from_millis(1500));
        assert!(!dir.path().join("straggler-survived").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unread_request_does_not_block_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "deaf.sh", "exec sleep 30");
        let mut monitor = manifest(
            dir.path(),
            "deaf",
            "display_name = \"Deaf\"\ncommand = \"deaf.sh\"\ntimeout_secs = 1\n",
        );
        // Far larger than a pipe buffer, and never read.
        let mut table = toml::Table::new();
        table.insert("blob".to_string(), toml::Value::String("x".repeat(1 << 20)));

        let started = Instant::now();
        let err = monitor.poll(&MonitorOptions::new(table)).unwrap_err();
        assert!(matches!(err, SrdError::MonitorTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn request_carries_first_run_flag() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "fresh.sh",
            r#"case "$(cat)" in
  *'"first_run":true'*) echo '{"dedup_key":"fresh","message":"first run"}' ;;
  *) echo '{"dedup_key":"steady","message":"later run"}' ;;
esac"#,
        );
        let mut monitor = manifest(
            dir.path(),
            "fresh",
            "display_name = \"Fresh\"\ncommand = \"fresh.sh\"\n",
        );
        let first = monitor
            .poll(&MonitorOptions::default().with_first_run(true))
            .unwrap();
        assert_eq!(first[0].dedup_key, "fresh");
        let later = monitor.poll(&MonitorOptions::default()).unwrap();
        assert_eq!(later[0].dedup_key, "steady");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn plugin_runs_in_its_own_process_group() {
        let dir = tempfile::tempdir().unwrap();
        script(
            dir.path(),
            "group.sh",
            r#"pgid=$(cut -d' ' -f5 /proc/$$/stat)
echo "{\"dedup_key\":\"$pgid\",\"message\":\"$$\"}""#,
        );
        let mut monitor = manifest(
            dir.path(),
            "group",
            "display_name = \"Group\"\ncommand = \"group.sh\"\n",
        );
        let signals = monitor.poll(&MonitorOptions::default()).unwrap();
        assert_eq!(signals[0].dedup_key, signals[0].message);
    }
}
