//! Handles to the running simulation engine.
//!
//! The monitor itself never looks at the simulation process. The CLI uses
//! these handles to stop monitoring once the engine has exited.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

/// Error type for process queries.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The PID does not fit the platform's PID type.
    #[error("Invalid process id: {0}")]
    InvalidPid(u32),

    /// Liveness cannot be checked on this platform.
    #[error("Process liveness checks are not supported on this platform")]
    Unsupported,

    /// Querying the process failed.
    #[error("Process query failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A simulation process the controller can observe.
pub trait SimulationProcess: Send {
    /// Process ID, if known.
    fn pid(&self) -> Option<u32>;

    /// Whether the process is still running.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    fn is_alive(&mut self) -> Result<bool, ProcessError>;

    /// Exit code once the process has exited, if it is observable.
    fn exit_code(&self) -> Option<i32>;
}

/// A process launched elsewhere, known only by PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidHandle {
    pid: u32,
}

impl PidHandle {
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl SimulationProcess for PidHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    #[cfg(unix)]
    fn is_alive(&mut self) -> Result<bool, ProcessError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(self.pid).map_err(|_| ProcessError::InvalidPid(self.pid))?;
        // Signal 0 only checks that the PID exists.
        match kill(Pid::from_raw(raw), None::<Signal>) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(ProcessError::Io(std::io::Error::from(e))),
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&mut self) -> Result<bool, ProcessError> {
        Err(ProcessError::Unsupported)
    }

    /// Exit codes of processes that are not our children are not observable.
    fn exit_code(&self) -> Option<i32> {
        None
    }
}

/// A simulation spawned by this process.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    pid: Option<u32>,
    status: Option<ExitStatus>,
}

impl ChildHandle {
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            status: None,
        }
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        Ok(status)
    }
}

impl SimulationProcess for ChildHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&mut self) -> Result<bool, ProcessError> {
        if self.status.is_some() {
            return Ok(false);
        }
        match self.child.try_wait()? {
            Some(status) => {
                self.status = Some(status);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Poll `process` every `interval` until it is no longer alive.
///
/// # Errors
///
/// Returns the first error from a liveness check.
pub async fn wait_for_exit<P>(process: &mut P, interval: Duration) -> Result<(), ProcessError>
where
    P: SimulationProcess + ?Sized,
{
    while process.is_alive()? {
        tokio::time::sleep(interval).await;
    }
    tracing::debug!(pid = ?process.pid(), code = ?process.exit_code(), "Simulation process exited");
    Ok(())
}
