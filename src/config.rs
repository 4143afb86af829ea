use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::threshold_store::DEFAULT_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory where log files will be stored
    pub directory: String,
    /// Log file name prefix (date will be appended)
    pub file_prefix: String,
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: "./logs".to_string(),
            file_prefix: "humidity_panel".to_string(),
            level: "info".to_string(),
        }
    }
}

/// Settings of the aggregate entity itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Host domain whose entities are enumerated on each poll
    pub domain: String,
    /// Substring an entity id must contain to be aggregated
    pub entity_filter: String,
    /// Threshold used when nothing valid has been persisted yet
    pub default_threshold: f64,
    pub poll_interval_seconds: u64,
    pub metrics_interval_seconds: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            domain: "sensor".to_string(),
            entity_filter: "humidity".to_string(),
            default_threshold: DEFAULT_THRESHOLD,
            poll_interval_seconds: 30,
            metrics_interval_seconds: 300,
        }
    }
}

impl PanelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_seconds.max(1))
    }
}

/// Locations of the files backing the local host collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// JSON snapshot of entity states, re-read on every poll
    pub states_file: String,
    /// Directory holding the versioned key-value records
    pub storage_directory: String,
    /// Where the latest panel report is written
    pub report_file: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            states_file: "states.json".to_string(),
            storage_directory: "./.storage".to_string(),
            report_file: "humidity_panel.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.panel.entity_filter.is_empty() {
            return Err("panel.entity_filter must not be empty".to_string());
        }
        if !self.panel.default_threshold.is_finite() {
            return Err("panel.default_threshold must be a finite number".to_string());
        }
        if self.panel.poll_interval_seconds == 0 {
            return Err("panel.poll_interval_seconds must be greater than zero".to_string());
        }
        Ok(())
    }
}
