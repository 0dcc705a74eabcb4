//! Integration tests for single poll cycles.

use std::sync::Arc;
use std::time::Duration;

use md_monitor::monitor::{keys, Poller, StreamKind};
use md_monitor::sink::{MemorySink, MetricsSink};

use crate::common::{memory_sink, values_of, SimDir};

fn poller(sim: &SimDir, sink: Arc<dyn MetricsSink>) -> Poller {
    Poller::new(Arc::new(sim.config(Duration::from_secs(30))), sink)
}

#[tokio::test]
async fn test_colvar_rows_reported_exactly_once() {
    let sim = SimDir::new();
    sim.append(&sim.colvar(), "#! FIELDS time phi psi\n");
    for i in 0..4 {
        sim.append(&sim.colvar(), &format!("{}.000 -1.{i} 2.{i}\n", i * 2));
    }
    let (sink, dyn_sink) = memory_sink();
    let mut poller = poller(&sim, dyn_sink);

    assert_eq!(poller.poll_once().await.timeseries_rows, 4);
    assert_eq!(poller.poll_once().await.timeseries_rows, 0);

    for i in 4..7 {
        sim.append(&sim.colvar(), &format!("{}.000 -1.{i} 2.{i}\n", i * 2));
    }
    assert_eq!(poller.poll_once().await.timeseries_rows, 3);
    assert_eq!(sink.emitted_with("phi").len(), 7);
    assert_eq!(poller.bookmarks().last_timeseries_row(), 7);
}

#[tokio::test]
async fn test_partial_colvar_line_waits_for_newline() {
    let sim = SimDir::new();
    sim.append(&sim.colvar(), "#! FIELDS time d1\n0.000 1.0\n0.002 1.");
    let (sink, dyn_sink) = memory_sink();
    let mut poller = poller(&sim, dyn_sink);

    assert_eq!(poller.poll_once().await.timeseries_rows, 1);
    sim.append(&sim.colvar(), "5\n");
    assert_eq!(poller.poll_once().await.timeseries_rows, 1);

    let d1: Vec<f64> = sink
        .emitted_with("d1")
        .iter()
        .filter_map(|m| m["d1"].as_f64())
        .collect();
    assert_eq!(d1, vec![1.0, 1.5]);
}

#[tokio::test]
async fn test_colvar_time_maps_to_step() {
    let sim = SimDir::new();
    sim.append(&sim.colvar(), "#! FIELDS time d1\n0.006 0.1\n0.007 0.2\n");
    let (sink, dyn_sink) = memory_sink();
    let mut poller = poller(&sim, dyn_sink);
    poller.poll_once().await;

    assert_eq!(values_of(&sink, keys::STEP), vec![3, 3]);
    let times: Vec<f64> = sink
        .emitted_with(keys::TIME)
        .iter()
        .filter_map(|m| m[keys::TIME].as_f64())
        .collect();
    assert_eq!(times, vec![0.006, 0.007]);
}

#[tokio::test]
async fn test_hills_growth_emitted_once_per_change() {
    let sim = SimDir::new();
    sim.append(&sim.hills(), "#! FIELDS time d1 sigma_d1 height biasf\n");
    sim.append_hills(3);
    let (sink, dyn_sink) = memory_sink();
    let mut poller = poller(&sim, dyn_sink);

    poller.poll_once().await;
    poller.poll_once().await;
    sim.append_hills(4);
    poller.poll_once().await;

    assert_eq!(values_of(&sink, keys::DEPOSITION_COUNT), vec![3, 7]);
}

#[tokio::test]
async fn test_truncated_energy_tail_is_retried() {
    let sim = SimDir::new();
    sim.write_energy(&[0, 10]);
    let mut bytes = std::fs::read(sim.edr()).unwrap();
    bytes.truncate(bytes.len() - 12);
    std::fs::write(sim.edr(), &bytes).unwrap();

    let (sink, dyn_sink) = memory_sink();
    let mut poller = poller(&sim, dyn_sink);
    let report = poller.poll_once().await;
    assert_eq!(report.trajectory_rows, 1);
    assert!(report.failures.is_empty());

    sim.write_energy(&[0, 10, 20]);
    assert_eq!(poller.poll_once().await.trajectory_rows, 2);
    assert_eq!(sink.emitted_with("Temperature").len(), 3);
}

#[tokio::test]
async fn test_unreadable_energy_file_isolated() {
    let sim = SimDir::new();
    std::fs::create_dir(sim.edr()).unwrap();
    sim.append(&sim.colvar(), "#! FIELDS time d1\n0.000 1.0\n");
    sim.append_hills(2);
    sim.append(
        &sim.log(),
        "           Step           Time\n          50000      100.00000\n\nPerformance:       12.5        1.92\n",
    );
    let (sink, dyn_sink) = memory_sink();
    let mut poller = poller(&sim, dyn_sink);

    let report = poller.poll_once().await;
    assert!(report.failed(StreamKind::Trajectory));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.timeseries_rows, 1);
    assert_eq!(report.deposition_count, Some(2));
    assert_eq!(report.throughput, Some(12.5));
    assert_eq!(sink.emitted_with(keys::THROUGHPUT).len(), 1);
}

#[tokio::test]
async fn test_rejected_emission_retried_next_cycle() {
    let sim = SimDir::new();
    sim.append_hills(2);
    let flaky = Arc::new(
        MemorySink::with_active_run().rejecting(|m| m.contains_key(keys::DEPOSITION_COUNT)),
    );
    let dyn_sink: Arc<dyn MetricsSink> = flaky.clone();
    let mut poller = poller(&sim, dyn_sink);

    let report = poller.poll_once().await;
    assert!(report.failed(StreamKind::Deposition));
    assert_eq!(poller.bookmarks().last_deposition_count(), 0);
    assert_eq!(poller.bookmarks().deposition_stamp(), None);

    // Unchanged file, but the stamp was not stored, so the count is read again.
    let report = poller.poll_once().await;
    assert!(report.failed(StreamKind::Deposition));
}
