//! Per-stream read cursors.

use serde::{Deserialize, Serialize};

use crate::parsers::FileStamp;

/// Cursor state for one monitor.
///
/// Every cursor only moves forward, and only after the data it covers has
/// been handed to the sink. The poll cycle is the only writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmarks {
    last_trajectory_step: Option<i64>,
    last_timeseries_row: usize,
    last_deposition_count: usize,
    trajectory_stamp: Option<FileStamp>,
    timeseries_stamp: Option<FileStamp>,
    deposition_stamp: Option<FileStamp>,
}

impl Bookmarks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest energy step already emitted.
    #[must_use]
    pub fn last_trajectory_step(&self) -> Option<i64> {
        self.last_trajectory_step
    }

    /// COLVAR data lines already consumed.
    #[must_use]
    pub fn last_timeseries_row(&self) -> usize {
        self.last_timeseries_row
    }

    /// Hill count last emitted.
    #[must_use]
    pub fn last_deposition_count(&self) -> usize {
        self.last_deposition_count
    }

    #[must_use]
    pub fn trajectory_stamp(&self) -> Option<FileStamp> {
        self.trajectory_stamp
    }

    #[must_use]
    pub fn timeseries_stamp(&self) -> Option<FileStamp> {
        self.timeseries_stamp
    }

    #[must_use]
    pub fn deposition_stamp(&self) -> Option<FileStamp> {
        self.deposition_stamp
    }

    pub(crate) fn advance_trajectory_step(&mut self, step: i64) {
        self.last_trajectory_step = Some(self.last_trajectory_step.map_or(step, |s| s.max(step)));
    }

    pub(crate) fn advance_timeseries_row(&mut self, rows: usize) {
        self.last_timeseries_row = self.last_timeseries_row.max(rows);
    }

    pub(crate) fn advance_deposition_count(&mut self, count: usize) {
        self.last_deposition_count = self.last_deposition_count.max(count);
    }

    pub(crate) fn set_trajectory_stamp(&mut self, stamp: FileStamp) {
        self.trajectory_stamp = Some(stamp);
    }

    pub(crate) fn set_timeseries_stamp(&mut self, stamp: FileStamp) {
        self.timeseries_stamp = Some(stamp);
    }

    pub(crate) fn set_deposition_stamp(&mut self, stamp: FileStamp) {
        self.deposition_stamp = Some(stamp);
    }
}

/// The current stamp if the file exists and differs from `stored`.
#[must_use]
pub(crate) fn changed_since(stored: Option<FileStamp>, current: Option<FileStamp>) -> Option<FileStamp> {
    let current = current?;
    (stored != Some(current)).then_some(current)
}
