//! Background scheduler and monitor lifecycle.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::sink::MetricsSink;

use super::bookmark::Bookmarks;
use super::error::MonitorError;
use super::poll::{PollReport, Poller, StreamFailure};
use super::state::MonitorState;

/// Latest view of a running monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub bookmarks: Bookmarks,
    /// Completed poll cycles, including ones that panicked.
    pub cycles: u64,
    pub last_failures: Vec<StreamFailure>,
    /// Message of the last cycle that panicked.
    pub last_cycle_error: Option<String>,
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartReport {
    pub monitored_paths: Vec<PathBuf>,
    pub poll_interval_s: f64,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped { flushed: bool },
    NotRunning,
}

/// The spawned side of a monitor. Owns the poller for its whole life.
struct Scheduler {
    poller: Poller,
    snapshots: watch::Sender<MonitorSnapshot>,
    cycles: u64,
}

impl Scheduler {
    async fn run_cycle(&mut self) -> Option<PollReport> {
        let outcome = AssertUnwindSafe(self.poller.poll_once())
            .catch_unwind()
            .await;
        self.cycles += 1;

        let (report, cycle_error) = match outcome {
            Ok(report) => (Some(report), None),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(error = %message, "Monitor cycle panicked");
                self.poller.report_cycle_error(&message).await;
                (None, Some(message))
            }
        };

        let bookmarks = self.poller.bookmarks().clone();
        let cycles = self.cycles;
        self.snapshots.send_modify(|snapshot| {
            snapshot.bookmarks = bookmarks;
            snapshot.cycles = cycles;
            if let Some(report) = &report {
                snapshot.last_failures.clone_from(&report.failures);
            }
            if cycle_error.is_some() {
                snapshot.last_cycle_error = cycle_error;
            }
        });
        report
    }

    async fn run(mut self, cancel: CancellationToken, interval: Duration) -> Self {
        tracing::debug!(interval = ?interval, "Monitor scheduler started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.run_cycle().await;

            tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        tracing::debug!(cycles = self.cycles, "Monitor scheduler exited");
        self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<Scheduler>,
}

/// A background monitor over one simulation's output files.
pub struct MdMonitor {
    config: Arc<MonitorConfig>,
    sink: Arc<dyn MetricsSink>,
    state: MonitorState,
    running: Option<Running>,
    snapshots: watch::Receiver<MonitorSnapshot>,
    snapshots_tx: Option<watch::Sender<MonitorSnapshot>>,
}

impl std::fmt::Debug for MdMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdMonitor")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MdMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig, sink: Arc<dyn MetricsSink>) -> Self {
        let (tx, rx) = watch::channel(MonitorSnapshot::default());
        Self {
            config: Arc::new(config),
            sink,
            state: MonitorState::Idle,
            running: None,
            snapshots: rx,
            snapshots_tx: Some(tx),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }

    /// Latest snapshot published by the scheduler.
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshots.clone()
    }

    /// Spawn the background scheduler.
    ///
    /// # Errors
    ///
    /// Fails without side effects if the monitor is not idle, the
    /// configuration is invalid, the sink has no open run, or there is no
    /// tokio runtime to spawn on.
    pub fn start(&mut self) -> Result<StartReport, MonitorError> {
        if !self.state.can_transition(MonitorState::Running) {
            return Err(MonitorError::AlreadyStarted(self.state));
        }
        self.config.validate()?;
        if !self.sink.has_active_context() {
            return Err(MonitorError::NoActiveRun);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let Some(snapshots) = self.snapshots_tx.take() else {
            return Err(MonitorError::AlreadyStarted(self.state));
        };

        let scheduler = Scheduler {
            poller: Poller::new(Arc::clone(&self.config), Arc::clone(&self.sink)),
            snapshots,
            cycles: 0,
        };
        let cancel = CancellationToken::new();
        let interval = self.config.poll_interval();
        let handle = runtime.spawn(scheduler.run(cancel.clone(), interval));

        self.running = Some(Running { cancel, handle });
        self.state = MonitorState::Running;

        let report = StartReport {
            monitored_paths: self
                .config
                .monitored_paths()
                .iter()
                .map(std::path::Path::to_path_buf)
                .collect(),
            poll_interval_s: interval.as_secs_f64(),
        };
        tracing::info!(
            paths = report.monitored_paths.len(),
            poll_interval_s = report.poll_interval_s,
            "Monitor started"
        );
        Ok(report)
    }

    /// Start, or close the sink's run if this idle monitor cannot start.
    ///
    /// For callers that opened the run only to hand it to this monitor.
    ///
    /// # Errors
    ///
    /// Same as [`MdMonitor::start`].
    pub async fn start_or_close(&mut self) -> Result<StartReport, MonitorError> {
        let err = match self.start() {
            Ok(report) => return Ok(report),
            Err(e) => e,
        };
        if self.state == MonitorState::Idle {
            if let Err(e) = self.sink.close_context().await {
                tracing::warn!(error = %e, "Failed to close tracking run");
            }
        }
        Err(err)
    }

    /// Stop the scheduler and optionally run a final poll.
    ///
    /// Waits at most the configured join timeout for the scheduler to
    /// exit. If it does not, the task is left detached and no flush runs.
    pub async fn stop(&mut self, final_flush: bool) -> StopOutcome {
        if self.state != MonitorState::Running {
            return StopOutcome::NotRunning;
        }
        let Some(Running { cancel, handle }) = self.running.take() else {
            return StopOutcome::NotRunning;
        };
        self.state = MonitorState::Stopped;
        cancel.cancel();

        let timeout = self.config.join_timeout();
        let scheduler = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(scheduler)) => Some(scheduler),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Monitor task failed");
                None
            }
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "Monitor task did not exit in time, detaching");
                None
            }
        };

        let mut flushed = false;
        if let Some(mut scheduler) = scheduler {
            if final_flush {
                scheduler.run_cycle().await;
                flushed = true;
            }
        }

        if let Err(e) = self.sink.close_context().await {
            tracing::warn!(error = %e, "Failed to close tracking run");
        }
        tracing::info!(flushed, "Monitor stopped");
        StopOutcome::Stopped { flushed }
    }
}

impl Drop for MdMonitor {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}
