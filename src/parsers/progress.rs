//! Progress lines from a GROMACS `.log` file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ParseError;

const PERFORMANCE_LABEL: &str = "Performance:";

/// Latest progress reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub step: i64,
    pub time_ps: f64,
    /// Throughput, only printed once the run finishes or at checkpoints.
    pub ns_per_day: Option<f64>,
}

/// Scan log text for the most recent step/time pair and throughput.
///
/// ```text
///            Step           Time
///           50000      100.00000
/// ...
/// Performance:        3.456        6.944
/// ```
#[must_use]
pub fn parse_progress_text(text: &str) -> Option<Progress> {
    let mut latest: Option<(i64, f64)> = None;
    let mut ns_per_day = None;

    for raw in text.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix(PERFORMANCE_LABEL) {
            if let Some(v) = rest.split_whitespace().next().and_then(|t| t.parse().ok()) {
                ns_per_day = Some(v);
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if let (Ok(step), Ok(time)) = (a.parse::<i64>(), b.parse::<f64>()) {
            latest = Some((step, time));
        }
    }

    latest.map(|(step, time_ps)| Progress {
        step,
        time_ps,
        ns_per_day,
    })
}

/// Read the latest progress from a log file.
///
/// Returns `None` when the file is missing or no step line has been
/// written yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn parse_progress(path: &Path) -> Result<Option<Progress>, ParseError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_progress_text(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ParseError::from_io(path, e)),
    }
}
