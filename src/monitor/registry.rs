//! Per-session monitor bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::MonitorConfig;
use crate::sink::MetricsSink;

use super::error::MonitorError;
use super::runner::{MdMonitor, MonitorSnapshot, StartReport, StopOutcome};

/// What a session key currently holds.
#[derive(Debug)]
enum Slot {
    Active(MdMonitor),
    /// A stop is joining, flushing or closing the run.
    Stopping,
}

/// Holds at most one monitor per session key.
///
/// A session stays occupied until its stop has returned, so a new monitor
/// never runs next to one that is still shutting down.
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitors: Mutex<HashMap<String, Slot>>,
}

/// Frees a `Stopping` slot when the stop finishes or is abandoned.
struct Release<'a> {
    registry: &'a MonitorRegistry,
    session: &'a str,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut monitors = self.registry.lock();
        if matches!(monitors.get(self.session), Some(Slot::Stopping)) {
            monitors.remove(self.session);
        }
    }
}

impl MonitorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a monitor for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::AlreadyRunning`] if the session already
    /// has a running monitor, which is left untouched, and
    /// [`MonitorError::Stopping`] while its previous monitor is still
    /// stopping. Start errors of the new monitor are passed through.
    pub fn start(
        &self,
        session: &str,
        config: MonitorConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<StartReport, MonitorError> {
        let mut monitors = self.lock();
        match monitors.get(session) {
            Some(Slot::Active(m)) if m.is_running() => {
                return Err(MonitorError::AlreadyRunning {
                    session: session.to_string(),
                });
            }
            Some(Slot::Stopping) => {
                return Err(MonitorError::Stopping {
                    session: session.to_string(),
                });
            }
            _ => {}
        }

        let mut monitor = MdMonitor::new(config, sink);
        let report = monitor.start()?;
        monitors.insert(session.to_string(), Slot::Active(monitor));
        tracing::debug!(session, "Registered monitor");
        Ok(report)
    }

    /// Stop and forget the monitor for `session`.
    ///
    /// The session is released only after the stop has returned. A stop
    /// requested while another is in progress returns `NotRunning`.
    pub async fn stop(&self, session: &str, final_flush: bool) -> StopOutcome {
        let mut monitor = {
            let mut monitors = self.lock();
            let Some(slot) = monitors.get_mut(session) else {
                return StopOutcome::NotRunning;
            };
            let Slot::Active(monitor) = std::mem::replace(slot, Slot::Stopping) else {
                return StopOutcome::NotRunning;
            };
            monitor
        };
        let _release = Release {
            registry: self,
            session,
        };
        monitor.stop(final_flush).await
    }

    #[must_use]
    pub fn snapshot(&self, session: &str) -> Option<MonitorSnapshot> {
        match self.lock().get(session) {
            Some(Slot::Active(m)) => Some(m.snapshot()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(&self, session: &str) -> bool {
        matches!(self.lock().get(session), Some(Slot::Active(m)) if m.is_running())
    }

    /// Whether a stop for `session` is still in progress.
    #[must_use]
    pub fn is_stopping(&self, session: &str) -> bool {
        matches!(self.lock().get(session), Some(Slot::Stopping))
    }

    /// Sessions with a running monitor, sorted.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(m) if m.is_running()))
            .map(|(k, _)| k.clone())
            .collect();
        sessions.sort();
        sessions
    }
}
