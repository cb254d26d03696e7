//! Errors raised while acquiring frames.

use thiserror::Error;

/// Errors that can occur during capture operations.
///
/// Decode failures are not part of this taxonomy: a malformed frame still
/// produces a [`DecodedPacket`](crate::DecodedPacket) carrying the reason.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Interface not found: {interface} ({reason})")]
    InterfaceNotFound { interface: String, reason: String },

    #[error("Capture session busy: already capturing on {active}, cannot start on {requested}")]
    SessionBusy { active: String, requested: String },

    #[error("Capture file unreadable: {path} ({reason})")]
    CaptureFileUnreadable { path: String, reason: String },

    #[error("Capture poll failed on {interface}: {reason}")]
    PollFailed { interface: String, reason: String },

    #[error("Failed to spawn capture worker: {0}")]
    WorkerSpawn(String),
}

impl CaptureError {
    /// Whether the error was caused by an interface that could not be opened.
    pub fn is_interface_not_found(&self) -> bool {
        matches!(self, CaptureError::InterfaceNotFound { .. })
    }
}
