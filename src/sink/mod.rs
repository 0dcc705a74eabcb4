//! Metrics sinks: the boundary to the experiment tracking service.
//!
//! A sink owns a run context. The controller opens it before starting a
//! monitor; the monitor emits into it and closes it on stop. Emission is
//! best effort and callers must treat every error as non-fatal.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{SinkKind, SinkSettings};

mod http;
mod jsonl;
mod memory;

pub use http::HttpSink;
pub use jsonl::{default_runs_root, JsonlSink};
pub use memory::MemorySink;

/// One emission: metric name to value.
pub type Metrics = serde_json::Map<String, serde_json::Value>;

/// Parameters for opening a tracking run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub project: String,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl RunSpec {
    #[must_use]
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Identity of an open tracking run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub project: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Errors raised by metrics sinks.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// No run context is open.
    #[error("No active tracking run")]
    NoActiveRun,

    /// Writing to the local run directory failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// The configured endpoint is not a valid URL.
    #[error("Invalid tracking endpoint: {0}")]
    InvalidEndpoint(String),

    /// API key environment variable is not set.
    #[error("API key not configured (env: {0})")]
    MissingApiKey(String),

    /// HTTP transport failure.
    #[error("Tracking request failed: {0}")]
    RequestFailed(String),

    /// The service answered with a non-success status.
    #[error("Tracking service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request exceeded its timeout.
    #[error("Tracking request timed out")]
    Timeout,

    /// The sink refused the metrics.
    #[error("Metrics rejected: {0}")]
    Rejected(String),

    /// Serialization failure.
    #[error("Failed to serialize metrics: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Destination for monitor metrics.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Open a run context, or return the one already open.
    async fn ensure_active_context(&self, run: &RunSpec) -> Result<RunInfo, SinkError>;

    /// Whether a run context is currently open.
    fn has_active_context(&self) -> bool;

    /// Record one set of metrics in the open run.
    async fn emit(&self, metrics: Metrics) -> Result<(), SinkError>;

    /// Close the run context. Closing when nothing is open is a no-op.
    async fn close_context(&self) -> Result<(), SinkError>;
}

/// Build the sink described by `settings`.
///
/// # Errors
///
/// Returns an error if an HTTP sink has no endpoint, an invalid one, or no
/// API key in its environment variable.
pub fn from_settings(settings: &SinkSettings) -> Result<Arc<dyn MetricsSink>, SinkError> {
    match settings.kind {
        SinkKind::Jsonl => {
            let root = settings.runs_dir.clone().unwrap_or_else(default_runs_root);
            tracing::debug!(root = %root.display(), "Using offline run directory");
            Ok(Arc::new(JsonlSink::new(root)))
        }
        SinkKind::Http => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .ok_or_else(|| SinkError::InvalidEndpoint("no endpoint configured".to_string()))?;
            tracing::debug!(endpoint, "Using tracking endpoint");
            Ok(Arc::new(HttpSink::from_env(endpoint, &settings.api_key_env)?))
        }
    }
}
