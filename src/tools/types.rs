//! Tool names, arguments and results.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::InvalidConfig;
use crate::monitor::MonitorError;
use crate::parsers::ParseError;
use crate::sink::SinkError;

/// Tools offered to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    InitRun,
    LogEnergy,
    LogColvar,
    StartMonitor,
    StopMonitor,
}

impl ToolName {
    pub const ALL: [Self; 5] = [
        Self::InitRun,
        Self::LogEnergy,
        Self::LogColvar,
        Self::StartMonitor,
        Self::StopMonitor,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitRun => "tracking_init_run",
            Self::LogEnergy => "tracking_log_energy",
            Self::LogColvar => "tracking_log_colvar",
            Self::StartMonitor => "start_background_monitor",
            Self::StopMonitor => "stop_monitor",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// Errors surfaced to the controller as `{status: "error"}` results.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] InvalidConfig),

    #[error("Reader task failed: {0}")]
    ReaderTask(String),
}

/// Arguments of `tracking_init_run`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitRunArgs {
    pub project: String,
    pub run_name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// Arguments of `tracking_log_energy`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogEnergyArgs {
    pub edr_file: PathBuf,
    #[serde(default)]
    pub energy_terms: Vec<String>,
    /// Only steps strictly after this one are logged.
    #[serde(default)]
    pub step_offset: Option<i64>,
}

/// Arguments of `tracking_log_colvar`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogColvarArgs {
    pub colvar_file: PathBuf,
    /// Time column, excluded from the logged values.
    #[serde(default = "default_step_col")]
    pub step_col: String,
    /// Data lines to skip.
    #[serde(default)]
    pub from_row: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
}

/// Arguments of `start_background_monitor`.
///
/// Unset tuning values fall back to the tool box defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartMonitorArgs {
    pub log_file: PathBuf,
    pub edr_file: PathBuf,
    #[serde(default)]
    pub colvar_file: Option<PathBuf>,
    #[serde(default)]
    pub hills_file: Option<PathBuf>,
    #[serde(default)]
    pub energy_terms: Vec<String>,
    #[serde(default)]
    pub poll_interval_s: Option<f64>,
    #[serde(default)]
    pub dt: Option<f64>,
}

/// Arguments of `stop_monitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StopMonitorArgs {
    #[serde(default = "default_final_flush")]
    pub final_flush: bool,
}

fn default_step_col() -> String {
    "time".to_string()
}

fn default_dt() -> f64 {
    0.002
}

fn default_final_flush() -> bool {
    true
}

/// Result of a tool call, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Initialized {
        run_id: String,
        project: String,
        name: String,
        url: Option<String>,
    },
    Logged(LogSummary),
    Started {
        monitored_paths: Vec<PathBuf>,
        poll_interval_s: f64,
    },
    Stopped {
        flushed: bool,
    },
    NotRunning,
    Error {
        tool: String,
        error: String,
    },
}

/// What a one-shot logging tool reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogSummary {
    Energy {
        logged_steps: usize,
        last_step: Option<i64>,
    },
    Colvar {
        logged_rows: usize,
        /// Cursor to pass as `from_row` on the next call.
        next_row: usize,
    },
}
