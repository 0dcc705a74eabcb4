//! Monitor tests.

mod lifecycle_test;
mod poll_test;

/// Verify the public monitor surface is exported from the library.
#[test]
fn test_monitor_types_exported() {
    use md_monitor::monitor::{
        keys, Bookmarks, MonitorError, MonitorRegistry, MonitorSnapshot, MonitorState, StopOutcome,
        StreamKind,
    };

    let _ = Bookmarks::new();
    let _ = MonitorRegistry::new();
    let _ = MonitorSnapshot::default();
    let _: fn() -> MonitorError = || MonitorError::NoActiveRun;
    assert_eq!(MonitorState::default(), MonitorState::Idle);
    assert_eq!(StopOutcome::NotRunning, StopOutcome::NotRunning);
    assert_eq!(StreamKind::Timeseries.to_string(), "timeseries");
    assert_eq!(keys::DEPOSITION_COUNT, "hills_deposited");
}
