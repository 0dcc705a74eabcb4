//! In-memory sink that records every emission.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Metrics, MetricsSink, RunInfo, RunSpec, SinkError};

type RejectFn = Box<dyn Fn(&Metrics) -> bool + Send + Sync>;

/// Sink that keeps emitted metrics in memory.
///
/// Useful for dry runs and for asserting on what a monitor reported.
#[derive(Default)]
pub struct MemorySink {
    run: Mutex<Option<RunInfo>>,
    emitted: Mutex<Vec<Metrics>>,
    closes: AtomicUsize,
    reject: Option<RejectFn>,
}

impl fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySink")
            .field("run", &self.current_run())
            .field("emitted", &self.emitted().len())
            .finish_non_exhaustive()
    }
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink with a run context already open.
    #[must_use]
    pub fn with_active_run() -> Self {
        let sink = Self::new();
        *sink.run.lock().unwrap_or_else(PoisonError::into_inner) = Some(RunInfo {
            run_id: "memory".to_string(),
            project: "memory".to_string(),
            name: "memory".to_string(),
            url: None,
        });
        sink
    }

    /// Reject any emission for which `predicate` returns true.
    #[must_use]
    pub fn rejecting<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Metrics) -> bool + Send + Sync + 'static,
    {
        self.reject = Some(Box::new(predicate));
        self
    }

    /// Snapshot of everything emitted so far, in order.
    #[must_use]
    pub fn emitted(&self) -> Vec<Metrics> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Emissions that carry `key`.
    #[must_use]
    pub fn emitted_with(&self, key: &str) -> Vec<Metrics> {
        self.emitted()
            .into_iter()
            .filter(|m| m.contains_key(key))
            .collect()
    }

    /// Number of times the context was closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn current_run(&self) -> Option<RunInfo> {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn ensure_active_context(&self, run: &RunSpec) -> Result<RunInfo, SinkError> {
        let mut slot = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        let info = slot.get_or_insert_with(|| RunInfo {
            run_id: uuid::Uuid::new_v4().to_string(),
            project: run.project.clone(),
            name: run.name.clone(),
            url: None,
        });
        Ok(info.clone())
    }

    fn has_active_context(&self) -> bool {
        self.current_run().is_some()
    }

    async fn emit(&self, metrics: Metrics) -> Result<(), SinkError> {
        if !self.has_active_context() {
            return Err(SinkError::NoActiveRun);
        }
        if let Some(reject) = &self.reject {
            if reject(&metrics) {
                return Err(SinkError::Rejected(
                    serde_json::Value::Object(metrics).to_string(),
                ));
            }
        }
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(metrics);
        Ok(())
    }

    async fn close_context(&self) -> Result<(), SinkError> {
        if self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
