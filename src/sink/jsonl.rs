//! Offline run directory sink.
//!
//! Layout: `<root>/<project>/<run_id>/run.json` holds the run spec and
//! timestamps, `metrics.jsonl` holds one object per emission.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{Metrics, MetricsSink, RunInfo, RunSpec, SinkError};

const RUN_FILE: &str = "run.json";
const METRICS_FILE: &str = "metrics.jsonl";

/// Returns the default root for offline runs.
///
/// This is `~/.local/share/md-monitor/runs` on Unix systems.
#[must_use]
pub fn default_runs_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("md-monitor")
        .join("runs")
}

#[derive(Debug)]
struct OpenRun {
    dir: PathBuf,
    metrics: File,
}

/// Sink that writes runs to a local directory tree.
#[derive(Debug)]
pub struct JsonlSink {
    root: PathBuf,
    info: Mutex<Option<RunInfo>>,
    open: tokio::sync::Mutex<Option<OpenRun>>,
}

impl JsonlSink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            info: Mutex::new(None),
            open: tokio::sync::Mutex::new(None),
        }
    }

    /// Sink rooted at [`default_runs_root`].
    #[must_use]
    pub fn with_default_root() -> Self {
        Self::new(default_runs_root())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the open run, if any.
    pub async fn run_dir(&self) -> Option<PathBuf> {
        self.open.lock().await.as_ref().map(|r| r.dir.clone())
    }

    fn current(&self) -> Option<RunInfo> {
        self.info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl MetricsSink for JsonlSink {
    async fn ensure_active_context(&self, run: &RunSpec) -> Result<RunInfo, SinkError> {
        let mut open = self.open.lock().await;
        if open.is_some() {
            if let Some(info) = self.current() {
                return Ok(info);
            }
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let dir = self.root.join(&run.project).join(&run_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(write_err(&dir))?;

        let run_file = dir.join(RUN_FILE);
        let record = json!({
            "run_id": run_id,
            "project": run.project,
            "name": run.name,
            "config": run.config,
            "tags": run.tags,
            "notes": run.notes,
            "started_at": Utc::now().to_rfc3339(),
        });
        tokio::fs::write(&run_file, serde_json::to_vec_pretty(&record)?)
            .await
            .map_err(write_err(&run_file))?;

        let metrics_path = dir.join(METRICS_FILE);
        let metrics = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics_path)
            .await
            .map_err(write_err(&metrics_path))?;

        let info = RunInfo {
            run_id,
            project: run.project.clone(),
            name: run.name.clone(),
            url: Some(format!("file://{}", dir.display())),
        };
        tracing::info!(run_id = %info.run_id, dir = %dir.display(), "Opened offline tracking run");

        *open = Some(OpenRun { dir, metrics });
        *self.info.lock().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
        Ok(info)
    }

    fn has_active_context(&self) -> bool {
        self.current().is_some()
    }

    async fn emit(&self, mut metrics: Metrics) -> Result<(), SinkError> {
        let mut open = self.open.lock().await;
        let run = open.as_mut().ok_or(SinkError::NoActiveRun)?;

        metrics.insert("_timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        let mut line = serde_json::to_vec(&serde_json::Value::Object(metrics))?;
        line.push(b'\n');

        let path = run.dir.join(METRICS_FILE);
        run.metrics
            .write_all(&line)
            .await
            .map_err(write_err(&path))?;
        run.metrics.flush().await.map_err(write_err(&path))?;
        Ok(())
    }

    async fn close_context(&self) -> Result<(), SinkError> {
        let mut open = self.open.lock().await;
        let Some(mut run) = open.take() else {
            return Ok(());
        };
        *self.info.lock().unwrap_or_else(PoisonError::into_inner) = None;

        run.metrics
            .flush()
            .await
            .map_err(write_err(&run.dir.join(METRICS_FILE)))?;

        let run_file = run.dir.join(RUN_FILE);
        let content = tokio::fs::read(&run_file)
            .await
            .map_err(write_err(&run_file))?;
        let mut record: serde_json::Value = serde_json::from_slice(&content)?;
        if let Some(obj) = record.as_object_mut() {
            obj.insert("ended_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        tokio::fs::write(&run_file, serde_json::to_vec_pretty(&record)?)
            .await
            .map_err(write_err(&run_file))?;

        tracing::info!(dir = %run.dir.display(), "Closed offline tracking run");
        Ok(())
    }
}
