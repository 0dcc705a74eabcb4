//! Monitor error types.

use std::time::Duration;

use crate::config::InvalidConfig;
use crate::parsers::ParseError;
use crate::sink::SinkError;

use super::state::MonitorState;

/// Errors that reject a monitor start.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// The sink has no open run context.
    #[error("No active tracking run: open one before starting the monitor")]
    NoActiveRun,

    /// This monitor has already left the idle state.
    #[error("Monitor cannot be started from the {0} state")]
    AlreadyStarted(MonitorState),

    /// The session already has a running monitor.
    #[error("A monitor is already running for session {session}. Stop it first.")]
    AlreadyRunning { session: String },

    /// The session's previous monitor has not finished stopping.
    #[error("The monitor for session {session} is still stopping. Try again shortly.")]
    Stopping { session: String },

    /// Configuration failed validation.
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(#[from] InvalidConfig),

    /// Start was called outside a tokio runtime.
    #[error("Monitor must be started from within a tokio runtime")]
    NoRuntime,
}

/// Failure of a single stream within one poll cycle.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// The reader failed in a way that waiting will not fix.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The sink refused or failed an emission.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The read did not finish within the read timeout.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// The reader panicked or was cancelled.
    #[error("Reader task failed: {0}")]
    ReaderTask(String),
}
