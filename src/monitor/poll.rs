//! One check-and-emit pass over every monitored stream.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{time_to_step, MonitorConfig};
use crate::parsers::{self, file_stamp, ColvarRow, ParseError};
use crate::sink::{Metrics, MetricsSink};

use super::bookmark::{changed_since, Bookmarks};
use super::error::StreamError;

/// Metric names emitted by the monitor.
pub mod keys {
    /// Engine step index.
    pub const STEP: &str = "md_step";
    /// Simulation time from the COLVAR time column, in ps.
    pub const TIME: &str = "time_ps";
    /// Number of hills deposited so far.
    pub const DEPOSITION_COUNT: &str = "hills_deposited";
    /// Throughput from the engine log.
    pub const THROUGHPUT: &str = "ns_per_day";
    /// Diagnostic for a cycle that failed outside the per-stream guards.
    pub const MONITOR_ERROR: &str = "monitor_error";
}

/// The streams a poll cycle visits, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Trajectory,
    Timeseries,
    Deposition,
    Progress,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trajectory => "trajectory",
            Self::Timeseries => "timeseries",
            Self::Deposition => "deposition",
            Self::Progress => "progress",
        })
    }
}

/// A stream that failed during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    pub stream: StreamKind,
    pub error: String,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollReport {
    /// Energy steps emitted.
    pub trajectory_rows: usize,
    /// COLVAR rows emitted.
    pub timeseries_rows: usize,
    /// Hill count emitted, when it grew.
    pub deposition_count: Option<usize>,
    /// Throughput emitted, when the log reports one.
    pub throughput: Option<f64>,
    pub failures: Vec<StreamFailure>,
}

impl PollReport {
    /// Total number of emissions made.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.trajectory_rows
            + self.timeseries_rows
            + usize::from(self.deposition_count.is_some())
            + usize::from(self.throughput.is_some())
    }

    /// Whether the stream failed in this cycle.
    #[must_use]
    pub fn failed(&self, stream: StreamKind) -> bool {
        self.failures.iter().any(|f| f.stream == stream)
    }

    fn record<T>(&mut self, stream: StreamKind, result: Result<T, StreamError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(stream = %stream, error = %e, "Monitor stream failed");
                self.failures.push(StreamFailure {
                    stream,
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

/// One energy record: the step plus each selected term.
pub(crate) fn energy_metrics(step: i64, values: BTreeMap<String, f64>) -> Metrics {
    let mut metrics = Metrics::new();
    metrics.insert(keys::STEP.to_string(), json!(step));
    for (term, value) in values {
        metrics.insert(term, json!(value));
    }
    metrics
}

/// One COLVAR record. The time column becomes `time_ps` and the step
/// derived from it; every other field is passed through.
pub(crate) fn colvar_metrics(row: ColvarRow, time_field: &str, dt: f64) -> Metrics {
    let time = row.get(time_field).unwrap_or(0.0);
    let mut metrics = Metrics::new();
    metrics.insert(keys::STEP.to_string(), json!(time_to_step(time, dt)));
    metrics.insert(keys::TIME.to_string(), json!(time));
    for (field, value) in row.values {
        if field != time_field {
            metrics.insert(field, json!(value));
        }
    }
    metrics
}

/// Runs a reader on the blocking pool, bounded by `timeout`.
async fn read_blocking<T, F>(timeout: Duration, read: F) -> Result<T, StreamError>
where
    F: FnOnce() -> Result<T, ParseError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(read)).await {
        Ok(Ok(result)) => result.map_err(StreamError::Parse),
        Ok(Err(e)) => Err(StreamError::ReaderTask(e.to_string())),
        Err(_) => Err(StreamError::Timeout(timeout)),
    }
}

/// Executes poll cycles and owns the bookmarks they advance.
pub struct Poller {
    config: Arc<MonitorConfig>,
    sink: Arc<dyn MetricsSink>,
    bookmarks: Bookmarks,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("bookmarks", &self.bookmarks)
            .finish_non_exhaustive()
    }
}

impl Poller {
    #[must_use]
    pub fn new(config: Arc<MonitorConfig>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            sink,
            bookmarks: Bookmarks::new(),
        }
    }

    #[must_use]
    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Check every stream once and emit what is new.
    ///
    /// A failing stream is recorded in the report and does not prevent
    /// the remaining streams from running.
    pub async fn poll_once(&mut self) -> PollReport {
        let mut report = PollReport::default();

        // Row counts include rows emitted before a stream failed.
        let result = self.poll_trajectory(&mut report.trajectory_rows).await;
        report.record(StreamKind::Trajectory, result);

        let result = self.poll_timeseries(&mut report.timeseries_rows).await;
        report.record(StreamKind::Timeseries, result);

        let result = self.poll_deposition().await;
        if let Some(count) = report.record(StreamKind::Deposition, result) {
            report.deposition_count = count;
        }

        let result = self.poll_progress().await;
        if let Some(throughput) = report.record(StreamKind::Progress, result) {
            report.throughput = throughput;
        }

        tracing::debug!(
            emitted = report.emitted(),
            failures = report.failures.len(),
            "Poll cycle complete"
        );
        report
    }

    /// Emit a diagnostic for a cycle that failed outside the stream guards.
    pub(crate) async fn report_cycle_error(&self, message: &str) {
        let mut metrics = Metrics::new();
        metrics.insert(keys::MONITOR_ERROR.to_string(), json!(message));
        if let Err(e) = self.sink.emit(metrics).await {
            tracing::debug!(error = %e, "Failed to report monitor error");
        }
    }

    async fn poll_trajectory(&mut self, emitted: &mut usize) -> Result<(), StreamError> {
        let path = self.config.energy_file.clone();
        let Some(stamp) = changed_since(self.bookmarks.trajectory_stamp(), file_stamp(&path)) else {
            return Ok(());
        };

        let terms = self.config.energy_terms.clone();
        let after = self.bookmarks.last_trajectory_step();
        let series = read_blocking(self.config.read_timeout(), move || {
            parsers::energy_since(&path, &terms, after)
        })
        .await?;

        for (step, values) in series {
            self.sink.emit(energy_metrics(step, values)).await?;
            self.bookmarks.advance_trajectory_step(step);
            *emitted += 1;
        }

        self.bookmarks.set_trajectory_stamp(stamp);
        Ok(())
    }

    async fn poll_timeseries(&mut self, emitted: &mut usize) -> Result<(), StreamError> {
        let Some(path) = self.config.colvar_file.clone() else {
            return Ok(());
        };
        let Some(stamp) = changed_since(self.bookmarks.timeseries_stamp(), file_stamp(&path)) else {
            return Ok(());
        };

        let skip = self.bookmarks.last_timeseries_row();
        let chunk = read_blocking(self.config.read_timeout(), move || {
            parsers::read_colvar(&path, skip)
        })
        .await?;

        for row in chunk.rows {
            let next = row.line + 1;
            let metrics = colvar_metrics(row, &self.config.time_field, self.config.dt);
            self.sink.emit(metrics).await?;
            self.bookmarks.advance_timeseries_row(next);
            *emitted += 1;
        }

        self.bookmarks.advance_timeseries_row(chunk.consumed);
        self.bookmarks.set_timeseries_stamp(stamp);
        Ok(())
    }

    async fn poll_deposition(&mut self) -> Result<Option<usize>, StreamError> {
        let Some(path) = self.config.hills_file.clone() else {
            return Ok(None);
        };
        let Some(stamp) = changed_since(self.bookmarks.deposition_stamp(), file_stamp(&path)) else {
            return Ok(None);
        };

        let count = read_blocking(self.config.read_timeout(), move || {
            parsers::count_hills(&path)
        })
        .await?;

        let mut reported = None;
        if count > self.bookmarks.last_deposition_count() {
            let mut metrics = Metrics::new();
            metrics.insert(keys::DEPOSITION_COUNT.to_string(), json!(count));
            self.sink.emit(metrics).await?;
            self.bookmarks.advance_deposition_count(count);
            reported = Some(count);
        }

        self.bookmarks.set_deposition_stamp(stamp);
        Ok(reported)
    }

    async fn poll_progress(&mut self) -> Result<Option<f64>, StreamError> {
        let path = self.config.log_file.clone();
        let progress = read_blocking(self.config.read_timeout(), move || {
            parsers::parse_progress(&path)
        })
        .await?;

        let Some(ns_per_day) = progress.and_then(|p| p.ns_per_day) else {
            return Ok(None);
        };
        let mut metrics = Metrics::new();
        metrics.insert(keys::THROUGHPUT.to_string(), json!(ns_per_day));
        self.sink.emit(metrics).await?;
        Ok(Some(ns_per_day))
    }
}
