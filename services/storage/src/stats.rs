//! Aggregates over the record log.

use crate::record::StoredRecord;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

/// Statistics over the entire record log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: u64,
    pub suspicious_count: u64,
    pub malicious_count: u64,
    /// Record count per protocol identifier
    pub protocol_distribution: BTreeMap<String, u64>,
    pub unique_source_ips: u64,
    pub unique_destination_ips: u64,
}

impl Statistics {
    /// Fold the statistics over `records` in one pass.
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a StoredRecord>,
    {
        let mut stats = Statistics::default();
        let mut sources: HashSet<Ipv4Addr> = HashSet::new();
        let mut destinations: HashSet<Ipv4Addr> = HashSet::new();

        for stored in records {
            let record = &stored.record;
            stats.total += 1;
            if record.is_suspicious() {
                stats.suspicious_count += 1;
            }
            if record.is_malicious() {
                stats.malicious_count += 1;
            }
            *stats
                .protocol_distribution
                .entry(record.packet.protocol.as_str().to_string())
                .or_insert(0) += 1;
            sources.extend(record.packet.src_ip);
            destinations.extend(record.packet.dst_ip);
        }

        stats.unique_source_ips = sources.len() as u64;
        stats.unique_destination_ips = destinations.len() as u64;
        stats
    }
}

// Grouped layout consumed by the dashboard
impl Serialize for Statistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Basic {
            packets_analyzed: u64,
        }

        #[derive(Serialize)]
        struct Security {
            suspicious_detected: u64,
            malicious_detected: u64,
        }

        #[derive(Serialize)]
        struct Network {
            unique_source_ips: u64,
            unique_destination_ips: u64,
        }

        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(
            "basic_statistics",
            &Basic {
                packets_analyzed: self.total,
            },
        )?;
        map.serialize_entry(
            "security_statistics",
            &Security {
                suspicious_detected: self.suspicious_count,
                malicious_detected: self.malicious_count,
            },
        )?;
        map.serialize_entry("protocol_distribution", &self.protocol_distribution)?;
        map.serialize_entry(
            "network_overview",
            &Network {
                unique_source_ips: self.unique_source_ips,
                unique_destination_ips: self.unique_destination_ips,
            },
        )?;
        map.end()
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

/// A flagged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub description: String,
    pub source_ip: Option<Ipv4Addr>,
    pub destination_ip: Option<Ipv4Addr>,
    pub severity: Severity,
}

impl Alert {
    /// Build an alert for a record labelled malicious or suspicious.
    pub fn from_record(stored: &StoredRecord) -> Option<Self> {
        let record = &stored.record;
        let severity = if record.is_malicious() {
            Severity::High
        } else if record.is_suspicious() {
            Severity::Medium
        } else {
            return None;
        };

        Some(Self {
            id: stored.id,
            timestamp: stored.timestamp,
            alert_type: record.label.clone(),
            description: record.label.clone(),
            source_ip: record.packet.src_ip,
            destination_ip: record.packet.dst_ip,
            severity,
        })
    }
}
