//! Monitor configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Energy terms reported when none are requested.
pub const DEFAULT_ENERGY_TERMS: [&str; 4] = ["Potential", "Kinetic En.", "Temperature", "Pressure"];

/// Errors from validating a [`MonitorConfig`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidConfig {
    #[error("poll interval must be positive and finite, got {0}")]
    PollInterval(f64),
    #[error("time step must be positive and finite, got {0}")]
    TimeStep(f64),
    #[error("{name} must be positive and finite, got {value}")]
    Timeout { name: &'static str, value: f64 },
}

/// Immutable configuration for one monitor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Engine progress log (`md.log`).
    pub log_file: PathBuf,
    /// Energy trajectory (`md.edr`).
    pub energy_file: PathBuf,
    /// PLUMED COLVAR output.
    #[serde(default)]
    pub colvar_file: Option<PathBuf>,
    /// PLUMED HILLS deposition log.
    #[serde(default)]
    pub hills_file: Option<PathBuf>,
    /// Energy terms to report.
    #[serde(default = "default_energy_terms")]
    pub energy_terms: Vec<String>,
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: f64,
    /// Integration time step in ps, used to turn COLVAR time into a step.
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// COLVAR field holding simulation time.
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Seconds `stop` waits for the scheduler task to exit.
    #[serde(default = "default_join_timeout_s")]
    pub join_timeout_s: f64,
    /// Seconds a single file read may take before the stream is reported failed.
    #[serde(default = "default_read_timeout_s")]
    pub read_timeout_s: f64,
}

#[must_use]
pub fn default_energy_terms() -> Vec<String> {
    DEFAULT_ENERGY_TERMS.iter().map(|s| (*s).to_string()).collect()
}

fn default_poll_interval_s() -> f64 {
    30.0
}

fn default_dt() -> f64 {
    0.002
}

fn default_time_field() -> String {
    "time".to_string()
}

fn default_join_timeout_s() -> f64 {
    60.0
}

fn default_read_timeout_s() -> f64 {
    30.0
}

impl MonitorConfig {
    /// Configuration for a log and energy file with default tuning.
    #[must_use]
    pub fn new(log_file: impl Into<PathBuf>, energy_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            energy_file: energy_file.into(),
            colvar_file: None,
            hills_file: None,
            energy_terms: default_energy_terms(),
            poll_interval_s: default_poll_interval_s(),
            dt: default_dt(),
            time_field: default_time_field(),
            join_timeout_s: default_join_timeout_s(),
            read_timeout_s: default_read_timeout_s(),
        }
    }

    #[must_use]
    pub fn with_colvar(mut self, path: impl Into<PathBuf>) -> Self {
        self.colvar_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_hills(mut self, path: impl Into<PathBuf>) -> Self {
        self.hills_file = Some(path.into());
        self
    }

    /// Replace the energy terms. An empty list keeps the defaults.
    #[must_use]
    pub fn with_energy_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        if !terms.is_empty() {
            self.energy_terms = terms;
        }
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_s = interval.as_secs_f64();
        self
    }

    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    #[must_use]
    pub fn with_time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = field.into();
        self
    }

    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_s = timeout.as_secs_f64();
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_s = timeout.as_secs_f64();
        self
    }

    /// Check the numeric settings.
    ///
    /// # Errors
    ///
    /// Returns the first setting that is zero, negative, or not finite.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !is_positive(self.poll_interval_s) {
            return Err(InvalidConfig::PollInterval(self.poll_interval_s));
        }
        if !is_positive(self.dt) {
            return Err(InvalidConfig::TimeStep(self.dt));
        }
        for (name, value) in [
            ("join timeout", self.join_timeout_s),
            ("read timeout", self.read_timeout_s),
        ] {
            if !is_positive(value) {
                return Err(InvalidConfig::Timeout { name, value });
            }
        }
        Ok(())
    }

    /// Interval between poll cycles. Only meaningful on a validated config.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        seconds(self.poll_interval_s)
    }

    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        seconds(self.join_timeout_s)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout_s)
    }

    /// Every path the monitor reads.
    #[must_use]
    pub fn monitored_paths(&self) -> MonitoredPaths {
        MonitoredPaths {
            log: self.log_file.clone(),
            edr: self.energy_file.clone(),
            colvar: self.colvar_file.clone(),
            hills: self.hills_file.clone(),
        }
    }

    /// Convert a COLVAR time into a step index using this config's `dt`.
    #[must_use]
    pub fn time_to_step(&self, time_ps: f64) -> i64 {
        time_to_step(time_ps, self.dt)
    }
}

/// Convert a simulation time into a step index.
///
/// Ratios within 1e-9 (relative) of an integer are taken as that
/// integer so that `0.006 / 0.002` maps to 3, not 2.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn time_to_step(time_ps: f64, dt: f64) -> i64 {
    let ratio = time_ps / dt;
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= 1e-9 * nearest.abs().max(1.0) {
        nearest as i64
    } else {
        ratio.floor() as i64
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn seconds(v: f64) -> Duration {
    Duration::try_from_secs_f64(v).unwrap_or(Duration::MAX)
}

/// Paths a monitor reads, as reported to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredPaths {
    pub log: PathBuf,
    pub edr: PathBuf,
    pub colvar: Option<PathBuf>,
    pub hills: Option<PathBuf>,
}

impl MonitoredPaths {
    /// Iterate over the configured paths.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [Some(&self.log), Some(&self.edr), self.colvar.as_ref(), self.hills.as_ref()]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
    }
}
