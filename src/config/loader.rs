//! Settings file loader.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::{default_energy_terms, MonitorConfig};

/// Tuning defaults applied to monitors started from the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorDefaults {
    pub poll_interval_s: f64,
    pub dt: f64,
    pub energy_terms: Vec<String>,
    pub time_field: String,
    pub join_timeout_s: f64,
    pub read_timeout_s: f64,
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        let base = MonitorConfig::new("", "");
        Self {
            poll_interval_s: base.poll_interval_s,
            dt: base.dt,
            energy_terms: default_energy_terms(),
            time_field: base.time_field,
            join_timeout_s: base.join_timeout_s,
            read_timeout_s: base.read_timeout_s,
        }
    }
}

impl MonitorDefaults {
    /// Build a monitor config for the given files using these defaults.
    #[must_use]
    pub fn config_for(&self, log_file: impl Into<PathBuf>, energy_file: impl Into<PathBuf>) -> MonitorConfig {
        MonitorConfig {
            energy_terms: self.energy_terms.clone(),
            poll_interval_s: self.poll_interval_s,
            dt: self.dt,
            time_field: self.time_field.clone(),
            join_timeout_s: self.join_timeout_s,
            read_timeout_s: self.read_timeout_s,
            ..MonitorConfig::new(log_file, energy_file)
        }
    }
}

/// Which sink the CLI should open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Jsonl,
    Http,
}

/// Sink settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub kind: SinkKind,
    /// Root for offline runs. Defaults to the user data directory.
    pub runs_dir: Option<PathBuf>,
    /// Base URL of the tracking service.
    pub endpoint: Option<String>,
    /// Environment variable holding the tracking API key.
    pub api_key_env: String,
    /// Project runs are filed under.
    pub project: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: SinkKind::Jsonl,
            runs_dir: None,
            endpoint: None,
            api_key_env: "MD_MONITOR_API_KEY".to_string(),
            project: "md-monitor".to_string(),
        }
    }
}

/// Contents of a settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorDefaults,
    pub sink: SinkSettings,
}

/// Settings loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .md-monitor.toml
        search_paths.push(PathBuf::from(".md-monitor.toml"));

        // 2. User config directory: ~/.config/md-monitor/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("md-monitor").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a loader with a specific settings file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load settings from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be parsed.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading settings file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No settings file found, using defaults");
        Ok(Settings::default())
    }

    fn load_from_path(path: &Path) -> Result<Settings, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during settings loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
