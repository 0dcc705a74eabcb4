//! JSON tool surface for the external controller.
//!
//! The controller calls tools by name with a JSON object of arguments and
//! receives a JSON object tagged by `status`. Every failure is reported as
//! `{status: "error", tool, error}`; dispatch itself never fails.

mod definitions;
mod types;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::{InvalidConfig, MonitorDefaults};
use crate::monitor::poll::{colvar_metrics, energy_metrics};
use crate::monitor::{MonitorRegistry, StopOutcome};
use crate::parsers::{self, ParseError};
use crate::sink::{MetricsSink, RunSpec};

pub use definitions::{definitions, ToolDefinition};
pub use types::{
    InitRunArgs, LogColvarArgs, LogEnergyArgs, LogSummary, StartMonitorArgs, StopMonitorArgs,
    ToolError, ToolName, ToolResult,
};

/// Tool handlers bound to one session and one sink.
pub struct ToolBox {
    session: String,
    registry: Arc<MonitorRegistry>,
    sink: Arc<dyn MetricsSink>,
    defaults: MonitorDefaults,
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox")
            .field("session", &self.session)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ToolBox {
    #[must_use]
    pub fn new(
        session: impl Into<String>,
        registry: Arc<MonitorRegistry>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            session: session.into(),
            registry,
            sink,
            defaults: MonitorDefaults::default(),
        }
    }

    /// Tuning used for monitors whose arguments leave it unset.
    #[must_use]
    pub fn with_defaults(mut self, defaults: MonitorDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    #[must_use]
    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    /// Definitions of every tool this box dispatches.
    #[must_use]
    pub fn definitions() -> Vec<ToolDefinition> {
        definitions()
    }

    /// Run a tool and encode its result.
    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        let result = match self.call(name, args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool call failed");
                ToolResult::Error {
                    tool: name.to_string(),
                    error: e.to_string(),
                }
            }
        };
        serde_json::to_value(&result).unwrap_or_else(|e| {
            json!({"status": "error", "tool": name, "error": e.to_string()})
        })
    }

    /// Run a tool and return its typed result.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown tools, malformed arguments, and any
    /// failure of the tool itself.
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        let tool: ToolName = name.parse()?;
        tracing::debug!(tool = %tool, session = %self.session, "Tool call");
        match tool {
            ToolName::InitRun => self.init_run(parse_args(args)?).await,
            ToolName::LogEnergy => self.log_energy(parse_args(args)?).await,
            ToolName::LogColvar => self.log_colvar(parse_args(args)?).await,
            ToolName::StartMonitor => self.start_monitor(parse_args(args)?),
            ToolName::StopMonitor => Ok(self.stop_monitor(parse_args(args)?).await),
        }
    }

    async fn init_run(&self, args: InitRunArgs) -> Result<ToolResult, ToolError> {
        let spec = RunSpec {
            project: args.project,
            name: args.run_name,
            config: args.config,
            tags: args.tags,
            notes: args.notes,
        };
        let run = self.sink.ensure_active_context(&spec).await?;
        tracing::info!(run_id = %run.run_id, project = %run.project, "Tracking run ready");
        Ok(ToolResult::Initialized {
            run_id: run.run_id,
            project: run.project,
            name: run.name,
            url: run.url,
        })
    }

    async fn log_energy(&self, args: LogEnergyArgs) -> Result<ToolResult, ToolError> {
        let terms = if args.energy_terms.is_empty() {
            self.defaults.energy_terms.clone()
        } else {
            args.energy_terms
        };
        let path = args.edr_file;
        let after = args.step_offset;
        let series = blocking(move || parsers::energy_since(&path, &terms, after)).await?;

        let mut logged_steps = 0;
        let mut last_step = after;
        for (step, values) in series {
            self.sink.emit(energy_metrics(step, values)).await?;
            logged_steps += 1;
            last_step = Some(step);
        }
        Ok(ToolResult::Logged(LogSummary::Energy {
            logged_steps,
            last_step,
        }))
    }

    async fn log_colvar(&self, args: LogColvarArgs) -> Result<ToolResult, ToolError> {
        if !(args.dt.is_finite() && args.dt > 0.0) {
            return Err(InvalidConfig::TimeStep(args.dt).into());
        }
        let path = args.colvar_file;
        let skip = args.from_row;
        let chunk = blocking(move || parsers::read_colvar(&path, skip)).await?;

        let mut logged_rows = 0;
        for row in chunk.rows {
            self.sink
                .emit(colvar_metrics(row, &args.step_col, args.dt))
                .await?;
            logged_rows += 1;
        }
        Ok(ToolResult::Logged(LogSummary::Colvar {
            logged_rows,
            next_row: chunk.consumed,
        }))
    }

    fn start_monitor(&self, args: StartMonitorArgs) -> Result<ToolResult, ToolError> {
        let mut config = self
            .defaults
            .config_for(args.log_file, args.edr_file)
            .with_energy_terms(args.energy_terms);
        if let Some(path) = args.colvar_file {
            config = config.with_colvar(path);
        }
        if let Some(path) = args.hills_file {
            config = config.with_hills(path);
        }
        if let Some(interval) = args.poll_interval_s {
            config.poll_interval_s = interval;
        }
        if let Some(dt) = args.dt {
            config = config.with_dt(dt);
        }

        let report = self
            .registry
            .start(&self.session, config, Arc::clone(&self.sink))?;
        Ok(ToolResult::Started {
            monitored_paths: report.monitored_paths,
            poll_interval_s: report.poll_interval_s,
        })
    }

    async fn stop_monitor(&self, args: StopMonitorArgs) -> ToolResult {
        match self.registry.stop(&self.session, args.final_flush).await {
            StopOutcome::Stopped { flushed } => ToolResult::Stopped { flushed },
            StopOutcome::NotRunning => ToolResult::NotRunning,
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    Ok(serde_json::from_value(args)?)
}

async fn blocking<T, F>(read: F) -> Result<T, ToolError>
where
    F: FnOnce() -> Result<T, ParseError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(read)
        .await
        .map_err(|e| ToolError::ReaderTask(e.to_string()))?
        .map_err(ToolError::from)
}
