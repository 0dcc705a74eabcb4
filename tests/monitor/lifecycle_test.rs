//! Integration tests for the monitor lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use md_monitor::monitor::{keys, MdMonitor, MonitorError, MonitorRegistry, MonitorState, StopOutcome};
use md_monitor::sink::{Metrics, MetricsSink, RunInfo, RunSpec, SinkError};
use tokio::time::timeout;

use crate::common::{memory_sink, values_of, SimDir};

const LONG: Duration = Duration::from_secs(3600);
const FAST: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_stop_right_after_start_still_reports() {
    let sim = SimDir::new();
    sim.write_energy(&[0, 100, 200]);
    let (sink, dyn_sink) = memory_sink();

    let mut monitor = MdMonitor::new(sim.config(LONG), dyn_sink);
    monitor.start().expect("start");
    let outcome = monitor.stop(true).await;

    assert_eq!(outcome, StopOutcome::Stopped { flushed: true });
    let steps: Vec<i64> = sink
        .emitted_with("Potential")
        .iter()
        .filter_map(|m| m[keys::STEP].as_i64())
        .collect();
    assert_eq!(steps, vec![0, 100, 200]);
    assert_eq!(sink.close_count(), 1);
}

#[tokio::test]
async fn test_background_loop_tails_growing_file() {
    let sim = SimDir::new();
    sim.write_energy(&[0, 10, 20]);
    let (sink, dyn_sink) = memory_sink();

    let mut monitor = MdMonitor::new(sim.config(FAST), dyn_sink);
    let mut rx = monitor.subscribe();
    monitor.start().expect("start");

    timeout(WAIT, rx.wait_for(|s| s.bookmarks.last_trajectory_step() == Some(20)))
        .await
        .expect("first frames not seen")
        .expect("scheduler exited");

    sim.write_energy(&[0, 10, 20, 30, 40]);
    timeout(WAIT, rx.wait_for(|s| s.bookmarks.last_trajectory_step() == Some(40)))
        .await
        .expect("appended frames not seen")
        .expect("scheduler exited");

    monitor.stop(true).await;

    let steps: Vec<i64> = sink
        .emitted_with("Potential")
        .iter()
        .filter_map(|m| m[keys::STEP].as_i64())
        .collect();
    assert_eq!(steps, vec![0, 10, 20, 30, 40], "each step reported exactly once");
}

#[tokio::test]
async fn test_second_start_leaves_running_monitor_alone() {
    let sim = SimDir::new();
    sim.append_hills(3);
    let (sink, dyn_sink) = memory_sink();
    let registry = MonitorRegistry::new();

    registry
        .start("default", sim.config(LONG), Arc::clone(&dyn_sink))
        .expect("first start");
    let before = registry.snapshot("default").expect("snapshot");

    let err = registry
        .start("default", sim.config(LONG), Arc::clone(&dyn_sink))
        .unwrap_err();
    assert!(matches!(err, MonitorError::AlreadyRunning { .. }));
    assert!(registry.is_active("default"));
    let after = registry.snapshot("default").expect("snapshot");
    assert!(after.cycles >= before.cycles);
    assert!(after.bookmarks.last_deposition_count() >= before.bookmarks.last_deposition_count());

    assert_eq!(
        registry.stop("default", true).await,
        StopOutcome::Stopped { flushed: true }
    );
    assert_eq!(values_of(&sink, keys::DEPOSITION_COUNT), vec![3]);
    assert_eq!(registry.stop("default", true).await, StopOutcome::NotRunning);
}

#[tokio::test]
async fn test_restart_is_rejected_after_stop() {
    let sim = SimDir::new();
    let (_sink, dyn_sink) = memory_sink();
    let mut monitor = MdMonitor::new(sim.config(LONG), dyn_sink);
    monitor.start().expect("start");
    monitor.stop(false).await;

    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(matches!(
        monitor.start(),
        Err(MonitorError::AlreadyStarted(MonitorState::Stopped))
    ));
    assert_eq!(monitor.stop(true).await, StopOutcome::NotRunning);
}

#[tokio::test]
async fn test_invalid_interval_rejected() {
    let sim = SimDir::new();
    let (_sink, dyn_sink) = memory_sink();
    let mut config = sim.config(LONG);
    config.poll_interval_s = 0.0;
    let mut monitor = MdMonitor::new(config, dyn_sink);
    assert!(matches!(monitor.start(), Err(MonitorError::InvalidConfig(_))));
    assert_eq!(monitor.state(), MonitorState::Idle);
}

/// Sink whose emit panics for energy records.
#[derive(Default)]
struct PanickingSink {
    errors: Mutex<Vec<String>>,
    emits: AtomicUsize,
}

#[async_trait]
impl MetricsSink for PanickingSink {
    async fn ensure_active_context(&self, run: &RunSpec) -> Result<RunInfo, SinkError> {
        Ok(RunInfo {
            run_id: "panic".to_string(),
            project: run.project.clone(),
            name: run.name.clone(),
            url: None,
        })
    }

    fn has_active_context(&self) -> bool {
        true
    }

    async fn emit(&self, metrics: Metrics) -> Result<(), SinkError> {
        self.emits.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = metrics.get(keys::MONITOR_ERROR).and_then(|v| v.as_str()) {
            self.errors.lock().unwrap().push(message.to_string());
            return Ok(());
        }
        assert!(!metrics.contains_key("Potential"), "sink exploded");
        Ok(())
    }

    async fn close_context(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_cycle_is_reported_and_loop_survives() {
    let sim = SimDir::new();
    sim.write_energy(&[0]);
    let sink = Arc::new(PanickingSink::default());
    let dyn_sink: Arc<dyn MetricsSink> = sink.clone();

    let mut monitor = MdMonitor::new(sim.config(FAST), dyn_sink);
    let mut rx = monitor.subscribe();
    monitor.start().expect("start");

    let snapshot = timeout(WAIT, rx.wait_for(|s| s.cycles >= 3))
        .await
        .expect("loop stalled")
        .expect("scheduler exited")
        .clone();
    assert_eq!(snapshot.last_cycle_error.as_deref(), Some("sink exploded"));

    assert_eq!(monitor.stop(false).await, StopOutcome::Stopped { flushed: false });
    let errors = sink.errors.lock().unwrap().clone();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| e == "sink exploded"));
}
