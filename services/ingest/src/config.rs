//! Capture configuration.
//!
//! Values are deserialized from the `capture` section of the application
//! configuration; every field has a default so the section may be omitted.

use serde::Deserialize;
use std::time::Duration;

/// Live capture configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Interface to capture on when none is given on the command line
    #[serde(default)]
    pub interface: Option<String>,

    /// Maximum number of bytes kept per frame
    #[serde(default = "default_snapshot_len")]
    pub snapshot_len: usize,

    /// Receive all frames on the link, not only those addressed to this host
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,

    /// Read-poll timeout in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Kernel read buffer size in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

// Default value functions
fn default_snapshot_len() -> usize {
    65536
}
fn default_promiscuous() -> bool {
    true
}
fn default_poll_timeout_ms() -> u64 {
    10
}
fn default_read_buffer_size() -> usize {
    65536
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            snapshot_len: default_snapshot_len(),
            promiscuous: default_promiscuous(),
            poll_timeout_ms: default_poll_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl CaptureConfig {
    /// Get the read-poll timeout as Duration.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.snapshot_len == 0 || self.snapshot_len > default_snapshot_len() {
            return Err(ConfigValidationError::InvalidValue {
                field: "capture.snapshot_len".to_string(),
                message: format!("must be between 1 and {}", default_snapshot_len()),
            });
        }

        if self.poll_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "capture.poll_timeout_ms".to_string(),
                message: "poll timeout must be greater than 0".to_string(),
            });
        }

        if self.read_buffer_size < self.snapshot_len {
            return Err(ConfigValidationError::InvalidValue {
                field: "capture.read_buffer_size".to_string(),
                message: "read buffer must hold at least one full snapshot".to_string(),
            });
        }

        if let Some(interface) = &self.interface {
            if interface.trim().is_empty() {
                return Err(ConfigValidationError::MissingField(
                    "capture.interface".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
