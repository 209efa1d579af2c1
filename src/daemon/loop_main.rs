//! The polling loop: one tick at a time, monitors in order, each behind its
//! own failure boundary.

#![allow(missing_docs)]

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng as _;
use serde::Serialize;

use super::shutdown::ShutdownHandle;
use crate::core::signal::{CandidateSignal, Notification, Priority};
use crate::dispatch::{DispatchOutcome, Dispatcher, FailureReason};
use crate::logger::{ActivityEvent, ActivityLog, Level};
use crate::registry::{MonitorDescriptor, MonitorOptions};

/// Lifecycle of the runner. Per-monitor phases repeat inside `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerPhase {
    Idle,
    Running,
    Invoking,
    Collecting,
    Dispatching,
    Stopped,
}

impl fmt::Display for RunnerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Invoking => "invoking",
            Self::Collecting => "collecting",
            Self::Dispatching => "dispatching",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Delay between the end of one tick and the start of the next.
    pub cadence: Duration,
    /// Up to this much is added to or taken from each delay.
    pub jitter: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(90),
            jitter: Duration::ZERO,
        }
    }
}

/// An enabled monitor and the option bundle it is polled with.
#[derive(Debug)]
pub struct MonitorSlot {
    pub descriptor: MonitorDescriptor,
    pub options: MonitorOptions,
}

impl MonitorSlot {
    #[must_use]
    pub fn new(descriptor: MonitorDescriptor, options: MonitorOptions) -> Self {
        Self {
            descriptor,
            options,
        }
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub monitors_run: usize,
    pub monitors_failed: usize,
    pub signals: usize,
    pub rejected: usize,
    pub notified: usize,
    pub notified_high: usize,
    /// Novel record-only signals committed without a send.
    pub recorded: usize,
    pub suppressed: usize,
    pub not_sent: usize,
    pub not_recorded: usize,
    pub elapsed_ms: u64,
}

impl TickReport {
    /// One-line summary used in logs and `srd once`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "tick={} monitors={} failed={} signals={} notified={} (high={}) recorded={} \
             suppressed={} not_sent={} not_recorded={} rejected={} elapsed_ms={}",
            self.tick,
            self.monitors_run,
            self.monitors_failed,
            self.signals,
            self.notified,
            self.notified_high,
            self.recorded,
            self.suppressed,
            self.not_sent,
            self.not_recorded,
            self.rejected,
            self.elapsed_ms
        )
    }

    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Notified { priority } => {
                self.notified += 1;
                if *priority == Priority::High {
                    self.notified_high += 1;
                }
            }
            DispatchOutcome::Recorded => self.recorded += 1,
            DispatchOutcome::Suppressed => self.suppressed += 1,
            DispatchOutcome::Failed(FailureReason::NotSent(_)) => self.not_sent += 1,
            DispatchOutcome::Failed(FailureReason::SentNotRecorded(_)) => self.not_recorded += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub notified: usize,
    pub failed_monitor_runs: usize,
}

pub struct Runner {
    monitors: Vec<MonitorSlot>,
    dispatcher: Dispatcher,
    settings: RunnerSettings,
    log: ActivityLog,
    phase: RunnerPhase,
    ticks: u64,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("monitors", &self.monitor_ids())
            .field("phase", &self.phase)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl Runner {
    #[must_use]
    pub fn new(
        monitors: Vec<MonitorSlot>,
        dispatcher: Dispatcher,
        settings: RunnerSettings,
        log: ActivityLog,
    ) -> Self {
        Self {
            monitors,
            dispatcher,
            settings,
            log,
            phase: RunnerPhase::Idle,
            ticks: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }

    #[must_use]
    pub fn monitor_ids(&self) -> Vec<&str> {
        self.monitors
            .iter()
            .map(|slot| slot.descriptor.id.as_str())
            .collect()
    }

    /// One-time "service started" message. Not deduplicated and never
    /// recorded; a failure is only logged.
    pub fn announce_start(&self) {
        let names: Vec<&str> = self
            .monitors
            .iter()
            .map(|slot| slot.descriptor.display_name.as_str())
            .collect();
        let message = if names.is_empty() {
            "Signal relay started with no enabled monitors.".to_string()
        } else {
            format!("Signal relay started. Monitoring: {}.", names.join(", "))
        };
        let notification =
            Notification::new(message, Priority::Normal).with_title("Signal relay started");
        match self.dispatcher.announce(&notification) {
            Ok(()) => self.log.info("daemon", "startup_notified", notification.message),
            Err(err) => self.log.warn("daemon", "startup_notify_failed", err.to_string()),
        }
    }

    /// Poll every monitor once, in order, dispatching each batch in yield
    /// order. Errors stay inside the monitor that raised them.
    pub fn run_tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.ticks += 1;
        self.phase = RunnerPhase::Running;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };
        self.log.info("runner", "tick_start", format!("tick={}", self.ticks));

        for idx in 0..self.monitors.len() {
            report.monitors_run += 1;
            self.phase = RunnerPhase::Invoking;
            let slot = &mut self.monitors[idx];
            let monitor_id = slot.descriptor.id.clone();
            let first_run = !self.dispatcher.store().has_history(&monitor_id);
            slot.options.set_first_run(first_run);
            let polled = slot.descriptor.monitor.poll(&slot.options);

            self.phase = RunnerPhase::Collecting;
            let signals = match polled {
                Ok(signals) => signals,
                Err(err) => {
                    report.monitors_failed += 1;
                    self.log.emit(
                        ActivityEvent::new(Level::Warn, "runner", "monitor_failed")
                            .monitor(&monitor_id)
                            .detail(format!("[{}] {err}", err.code())),
                    );
                    continue;
                }
            };
            self.log.emit(
                ActivityEvent::new(Level::Info, "runner", "monitor_polled")
                    .monitor(&monitor_id)
                    .detail(format!("signals={}", signals.len())),
            );

            self.phase = RunnerPhase::Dispatching;
            for signal in signals {
                report.signals += 1;
                if let Some(reason) = rejection(&signal) {
                    report.rejected += 1;
                    self.log.emit(
                        ActivityEvent::new(Level::Warn, "runner", "signal_rejected")
                            .monitor(&monitor_id)
                            .detail(reason),
                    );
                    continue;
                }
                let outcome = self.dispatcher.evaluate(&monitor_id, &signal);
                report.record(&outcome);
            }
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.phase = RunnerPhase::Idle;
        let level = if report.monitors_failed > 0 || report.not_recorded > 0 {
            Level::Warn
        } else {
            Level::Info
        };
        self.log
            .emit(ActivityEvent::new(level, "runner", "tick_end").detail(report.summary()));
        report
    }

    /// Tick until shutdown (or `max_ticks`). Shutdown is only observed
    /// between ticks; the sleep in between wakes early on request.
    pub fn run(&mut self, shutdown: &ShutdownHandle, max_ticks: Option<u64>) -> RunSummary {
        let mut summary = RunSummary::default();
        self.log.info(
            "runner",
            "started",
            format!(
                "monitors=[{}] cadence_s={}",
                self.monitor_ids().join(","),
                self.settings.cadence.as_secs()
            ),
        );

        while !shutdown.is_triggered() {
            let report = self.run_tick();
            summary.ticks += 1;
            summary.notified += report.notified;
            summary.failed_monitor_runs += report.monitors_failed;

            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            if shutdown.wait(self.next_delay()) {
                break;
            }
        }

        self.phase = RunnerPhase::Stopped;
        self.log.info(
            "runner",
            "stopped",
            format!("ticks={} notified={}", summary.ticks, summary.notified),
        );
        summary
    }

    /// Cadence with jitter applied, never below one second unless the cadence
    /// itself is shorter.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        jittered(self.settings.cadence, self.settings.jitter)
    }
}

fn jittered(cadence: Duration, jitter: Duration) -> Duration {
    let spread = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    if spread == 0 {
        return cadence;
    }
    let offset = rand::rng().random_range(0..=spread.saturating_mul(2));
    let delayed = cadence + Duration::from_millis(offset);
    let delay = delayed.saturating_sub(jitter);
    delay.max(Duration::from_secs(1).min(cadence))
}

fn rejection(signal: &CandidateSignal) -> Option<String> {
    if signal.dedup_key.trim().is_empty() {
        return Some("empty dedup key".to_string());
    }
    if signal.message.trim().is_empty() {
        return Some(format!("empty message for key {:?}", signal.dedup_key));
    }
    None
}
