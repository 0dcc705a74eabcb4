//! Tool descriptions handed to the controller.

use serde::Serialize;
use serde_json::{json, Value};

use super::types::ToolName;

/// Name, description and JSON schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolName {
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::InitRun => "Open a tracking run. Must be called before starting the monitor.",
            Self::LogEnergy => "Parse a GROMACS .edr file once and log the selected energy terms.",
            Self::LogColvar => "Parse a PLUMED COLVAR file once and log collective variable values.",
            Self::StartMonitor => {
                "Start a background monitor that tails log/edr/COLVAR/HILLS files \
                 and logs new data. Call this right after launching mdrun."
            }
            Self::StopMonitor => {
                "Stop the background monitor, optionally poll one last time, and close the run."
            }
        }
    }

    #[must_use]
    pub fn input_schema(self) -> Value {
        let strings = json!({"type": "array", "items": {"type": "string"}});
        match self {
            Self::InitRun => json!({
                "type": "object",
                "properties": {
                    "project": {"type": "string"},
                    "run_name": {"type": "string"},
                    "config": {"type": "object"},
                    "tags": strings,
                    "notes": {"type": "string", "default": ""},
                },
                "required": ["project", "run_name"],
            }),
            Self::LogEnergy => json!({
                "type": "object",
                "properties": {
                    "edr_file": {"type": "string"},
                    "energy_terms": strings,
                    "step_offset": {"type": ["integer", "null"], "default": null},
                },
                "required": ["edr_file"],
            }),
            Self::LogColvar => json!({
                "type": "object",
                "properties": {
                    "colvar_file": {"type": "string"},
                    "step_col": {"type": "string", "default": "time"},
                    "from_row": {"type": "integer", "default": 0},
                    "dt": {"type": "number", "default": 0.002},
                },
                "required": ["colvar_file"],
            }),
            Self::StartMonitor => json!({
                "type": "object",
                "properties": {
                    "log_file": {"type": "string"},
                    "edr_file": {"type": "string"},
                    "colvar_file": {"type": ["string", "null"], "default": null},
                    "hills_file": {"type": ["string", "null"], "default": null},
                    "energy_terms": strings,
                    "poll_interval_s": {"type": "number", "default": 30.0},
                    "dt": {"type": "number", "default": 0.002},
                },
                "required": ["log_file", "edr_file"],
            }),
            Self::StopMonitor => json!({
                "type": "object",
                "properties": {
                    "final_flush": {"type": "boolean", "default": true},
                },
            }),
        }
    }

    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

/// Definitions of every tool.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.into_iter().map(ToolName::definition).collect()
}
