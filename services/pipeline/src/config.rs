//! Application configuration.
//!
//! Loaded in layers: `config/default`, `config/{RUN_MODE}`, an optional
//! explicit file, then environment variables such as
//! `PACKETLENS__CAPTURE__INTERFACE=eth0`.

use config::{Config, ConfigError, Environment, File};
use packetlens_ingest::{CaptureConfig, ConfigValidationError};
use packetlens_storage::StorageConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete configuration for the `packetlens` binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// What the capture worker does when the dispatch queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Discard the frame and count it
    #[default]
    Drop,
    /// Wait for room in the queue
    Block,
}

impl BackpressurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackpressurePolicy::Drop => "drop",
            BackpressurePolicy::Block => "block",
        }
    }
}

/// Capture-to-store hand-off settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of the queue between the capture worker and the dispatcher
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default)]
    pub backpressure: BackpressurePolicy,

    /// Interval between status log lines in seconds
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to include source code location
    #[serde(default)]
    pub include_location: bool,
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_queue_size() -> usize {
    1024
}
fn default_status_interval_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            backpressure: BackpressurePolicy::default(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            include_location: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl PipelineConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

impl AppConfig {
    /// Load configuration from files and environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // Start with default config
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Override with environment variables (e.g., PACKETLENS__CAPTURE__INTERFACE)
            .add_source(
                Environment::with_prefix("PACKETLENS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.capture.validate()?;

        if self.pipeline.queue_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "pipeline.queue_size".to_string(),
                message: "queue size must be greater than 0".to_string(),
            });
        }

        if self.pipeline.status_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "pipeline.status_interval_secs".to_string(),
                message: "status interval must be greater than 0".to_string(),
            });
        }

        if self.storage.default_page_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.default_page_size".to_string(),
                message: "page size must be greater than 0".to_string(),
            });
        }

        if self.storage.max_records == Some(0) {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.max_records".to_string(),
                message: "omit the limit instead of setting it to 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigValidationError::InvalidValue {
                field: "logging.level".to_string(),
                message: format!("must be one of {:?}", valid_levels),
            });
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue {
                field: "logging.format".to_string(),
                message: "must be json or pretty".to_string(),
            });
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "metrics.port".to_string(),
                message: "port must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn test_defaults() {
        let config = create_test_config();
        assert_eq!(config.pipeline.queue_size, 1024);
        assert_eq!(config.pipeline.backpressure, BackpressurePolicy::Drop);
        assert_eq!(config.pipeline.status_interval(), Duration::from_secs(30));
        assert_eq!(config.storage.alert_limit, 100);
        assert_eq!(config.logging.format, "json");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_queue_size() {
        let mut config = create_test_config();
        config.pipeline.queue_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { ref field, .. }) if field == "pipeline.queue_size"
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_test_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capture_section_validated() {
        let mut config = create_test_config();
        config.capture.poll_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
interface = "eth1"

[pipeline]
queue_size = 64
backpressure = "block"

[storage]
max_records = 1000
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.interface.as_deref(), Some("eth1"));
        assert_eq!(config.capture.snapshot_len, 65536);
        assert_eq!(config.pipeline.queue_size, 64);
        assert_eq!(config.pipeline.backpressure, BackpressurePolicy::Block);
        assert_eq!(config.storage.max_records, Some(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/packetlens.toml"))).is_err());
    }
}
