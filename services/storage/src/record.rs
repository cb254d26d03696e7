//! Record types held by the store.

use chrono::{DateTime, Utc};
use packetlens_ingest::DecodedPacket;
use serde::{Deserialize, Serialize};

/// A decoded packet with the label assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub packet: DecodedPacket,
    /// Classification label; free-form for records submitted by collaborators
    pub label: String,
    /// Capture time of the originating frame, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ClassifiedRecord {
    pub fn new(packet: DecodedPacket, label: impl Into<String>) -> Self {
        Self {
            packet,
            label: label.into(),
            captured_at: None,
        }
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Label mentions "suspicious", ignoring case.
    pub fn is_suspicious(&self) -> bool {
        label_contains(&self.label, "suspicious")
    }

    /// Label mentions "malicious", ignoring case.
    pub fn is_malicious(&self) -> bool {
        label_contains(&self.label, "malicious")
    }
}

fn label_contains(label: &str, needle: &str) -> bool {
    label.to_ascii_lowercase().contains(needle)
}

/// A record as persisted in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    /// Persistence time
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: ClassifiedRecord,
}
