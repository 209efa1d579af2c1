//! Pushover delivery over HTTPS, shelling out to `curl`.
//!
//! Form fields, credentials included, reach curl as a config file on stdin
//! (`--config -`), never on its command line where `ps` would show them.

use std::fmt::Write as _;
use std::io::Write as _;
use std::process::{Command, Stdio};

use crate::core::config::PushoverConfig;
use crate::core::errors::{Result, SrdError};
use crate::core::process;
use crate::core::signal::Notification;

use super::{Transport, truncate_chars};

const MAX_TITLE: usize = 250;
const MAX_MESSAGE: usize = 1024;
const MAX_URL: usize = 512;
const URL_TITLE: &str = "View Full Post";
const DEFAULT_TITLE: &str = "Signal relay";

/// Pushover messages API client.
#[derive(Debug, Clone)]
pub struct PushoverTransport {
    config: PushoverConfig,
}

impl PushoverTransport {
    #[must_use]
    pub fn new(config: PushoverConfig) -> Self {
        Self { config }
    }

    /// Form fields in submission order, with provider length limits applied.
    #[must_use]
    pub fn form_fields(&self, notification: &Notification) -> Vec<(&'static str, String)> {
        let title = notification.title.as_deref().unwrap_or(DEFAULT_TITLE);
        let mut fields = vec![
            ("token", self.config.api_token.clone()),
            ("user", self.config.user_key.clone()),
            ("title", truncate_chars(title, MAX_TITLE).to_string()),
            (
                "message",
                truncate_chars(&notification.message, MAX_MESSAGE).to_string(),
            ),
            ("priority", notification.priority.level().to_string()),
        ];
        if let Some(url) = notification.url.as_deref().filter(|u| !u.is_empty()) {
            fields.push(("url", truncate_chars(url, MAX_URL).to_string()));
            fields.push(("url_title", URL_TITLE.to_string()));
        }
        fields
    }

    /// curl arguments. Everything secret travels in [`Self::curl_config`].
    #[must_use]
    pub fn curl_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["--silent", "--show-error", "--max-time"]
            .map(String::from)
            .to_vec();
        args.push(self.config.timeout_secs.max(1).to_string());
        args.extend(
            ["--output", "-", "--write-out", "\n%{http_code}", "--config", "-"].map(String::from),
        );
        args.push(self.config.endpoint.clone());
        args
    }

    /// curl config text: one quoted `form-string` line per form field.
    #[must_use]
    pub fn curl_config(&self, notification: &Notification) -> String {
        let mut config = String::new();
        for (name, value) in self.form_fields(notification) {
            let _ = writeln!(
                config,
                "form-string = \"{}\"",
                quote_config_value(&format!("{name}={value}"))
            );
        }
        config
    }
}

/// Escape for a double-quoted curl config value.
fn quote_config_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

impl Transport for PushoverTransport {
    fn name(&self) -> &'static str {
        "pushover"
    }

    fn send(&self, notification: &Notification) -> Result<()> {
        let mut cmd = Command::new("curl");
        cmd.args(self.curl_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = process::isolate(&mut cmd)
            .spawn()
            .map_err(|e| SrdError::Transport {
                transport: "pushover",
                details: format!("curl not found or failed: {e}"),
                retryable: false,
            })?;

        let fed = child.stdin.take().map_or(Ok(()), |mut stdin| {
            stdin.write_all(self.curl_config(notification).as_bytes())
        });
        let output = child.wait_with_output().map_err(|e| SrdError::Transport {
            transport: "pushover",
            details: format!("waiting for curl failed: {e}"),
            retryable: true,
        })?;
        if let Err(e) = fed {
            return Err(SrdError::Transport {
                transport: "pushover",
                details: format!("cannot hand the form to curl: {e}"),
                retryable: true,
            });
        }

        if !output.status.success() {
            // curl-level failure: DNS, connect, timeout.
            return Err(SrdError::Transport {
                transport: "pushover",
                details: format!(
                    "curl exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                retryable: true,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (body, status) = split_status(&stdout);
        classify_status(status, body)
    }
}

/// Split curl output into (body, http status) using the trailing status line.
fn split_status(stdout: &str) -> (&str, u16) {
    let trimmed = stdout.trim_end();
    match trimmed.rsplit_once('\n') {
        Some((body, code)) => (body, code.trim().parse().unwrap_or(0)),
        None => ("", trimmed.trim().parse().unwrap_or(0)),
    }
}

fn classify_status(status: u16, body: &str) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        429 | 500..=599 | 0 => Err(SrdError::Transport {
            transport: "pushover",
            details: format!("HTTP {status}: {}", truncate_chars(body.trim(), 200)),
            retryable: true,
        }),
        _ => Err(SrdError::Transport {
            transport: "pushover",
            details: format!("HTTP {status}: {}", truncate_chars(body.trim(), 200)),
            retryable: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signal::Priority;

    fn transport() -> PushoverTransport {
        PushoverTransport::new(PushoverConfig {
            user_key: "user".to_string(),
            api_token: "token".to_string(),
            ..PushoverConfig::default()
        })
    }

    #[test]
    fn form_fields_apply_limits_and_priority() {
        let long = "x".repeat(2_000);
        let mut note = Notification::new(long, Priority::High);
        note.url = Some("https://truthsocial.com/@someone/1".to_string());
        let fields = transport().form_fields(&note);

        let get = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("message").chars().count(), MAX_MESSAGE);
        assert_eq!(get("priority"), "1");
        assert_eq!(get("title"), DEFAULT_TITLE);
        assert_eq!(get("url_title"), URL_TITLE);
    }

    #[test]
    fn url_fields_are_omitted_without_url() {
        let note = Notification::new("hi", Priority::Normal);
        let fields = transport().form_fields(&note);
        assert!(fields.iter().all(|(n, _)| *n != "url" && *n != "url_title"));
        assert!(fields.iter().any(|(n, v)| *n == "priority" && v == "0"));
    }

    #[test]
    fn credentials_stay_off_the_command_line() {
        let config = PushoverConfig {
            user_key: "u-secret-key".to_string(),
            api_token: "a-secret-token".to_string(),
            ..PushoverConfig::default()
        };
        let pushover = PushoverTransport::new(config.clone());
        let args = pushover.curl_args();
        assert!(args.iter().all(|a| !a.contains("secret")));
        assert!(args.windows(2).any(|pair| pair == ["--config", "-"]));
        assert_eq!(args.last(), Some(&config.endpoint));

        let body = pushover.curl_config(&Notification::new("hi", Priority::Normal));
        assert!(body.contains("form-string = \"token=a-secret-token\"\n"));
        assert!(body.contains("form-string = \"user=u-secret-key\"\n"));
    }

    #[test]
    fn config_values_are_escaped() {
        let note = Notification::new("say \"hi\"\nC:\\temp", Priority::Normal);
        let body = transport().curl_config(&note);
        assert!(body.contains(r#"form-string = "message=say \"hi\"\nC:\\temp""#));
        // One line per field, whatever the message contains.
        assert_eq!(body.lines().count(), transport().form_fields(&note).len());
    }

    #[test]
    fn status_line_is_split_from_body() {
        assert_eq!(split_status("{\"status\":1}\n200"), ("{\"status\":1}", 200));
        assert_eq!(split_status("200\n"), ("", 200));
        assert_eq!(split_status(""), ("", 0));
    }

    #[test]
    fn statuses_map_to_retryability() {
        assert!(classify_status(200, "").is_ok());
        assert!(classify_status(503, "").unwrap_err().is_retryable());
        assert!(classify_status(429, "").unwrap_err().is_retryable());
        assert!(!classify_status(400, "bad token").unwrap_err().is_retryable());
    }
}
