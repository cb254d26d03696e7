//! Record filters and result pages.

use crate::error::StoreError;
use crate::record::{ClassifiedRecord, StoredRecord};
use packetlens_ingest::Protocol;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Query parameters for record search.
///
/// All set filters must match. Pages are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub protocol: Option<Protocol>,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    /// Only records whose label mentions "suspicious"
    pub suspicious_only: bool,
    /// Only records whose label mentions "malicious"
    pub malicious_only: bool,
    pub page: usize,
    pub page_size: usize,
}

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 25;

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            protocol: None,
            src_ip: None,
            dst_ip: None,
            suspicious_only: false,
            malicious_only: false,
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RecordQuery {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.page == 0 {
            return Err(StoreError::InvalidQuery("page starts at 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(StoreError::InvalidQuery(
                "page_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of matching records skipped before this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    pub fn matches(&self, record: &ClassifiedRecord) -> bool {
        let packet = &record.packet;
        self.protocol.map_or(true, |p| packet.protocol == p)
            && self.src_ip.map_or(true, |ip| packet.src_ip == Some(ip))
            && self.dst_ip.map_or(true, |ip| packet.dst_ip == Some(ip))
            && (!self.suspicious_only || record.is_suspicious())
            && (!self.malicious_only || record.is_malicious())
    }
}

/// One page of query results, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub records: Vec<StoredRecord>,
    /// Size of the whole log, regardless of filters
    pub total: u64,
    /// Number of records matching the filters
    pub matched: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetlens_ingest::DecodedPacket;

    fn record(protocol: Protocol, src: [u8; 4], label: &str) -> ClassifiedRecord {
        ClassifiedRecord::new(
            DecodedPacket {
                src_ip: Some(Ipv4Addr::from(src)),
                dst_ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
                protocol,
                length: 64,
                ..Default::default()
            },
            label,
        )
    }

    #[test]
    fn test_default_query_matches_everything() {
        let query = RecordQuery::default();
        assert!(query.validate().is_ok());
        assert_eq!(query.offset(), 0);
        assert!(query.matches(&record(Protocol::Tcp, [1, 2, 3, 4], "UNKNOWN")));
        assert!(query.matches(&ClassifiedRecord::new(DecodedPacket::failed(3, "short"), "UNKNOWN")));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let query = RecordQuery {
            protocol: Some(Protocol::Udp),
            src_ip: Some(Ipv4Addr::new(192, 168, 1, 2)),
            suspicious_only: true,
            ..Default::default()
        };

        assert!(query.matches(&record(Protocol::Udp, [192, 168, 1, 2], "suspicious-dns")));
        assert!(!query.matches(&record(Protocol::Tcp, [192, 168, 1, 2], "suspicious-dns")));
        assert!(!query.matches(&record(Protocol::Udp, [192, 168, 1, 3], "suspicious-dns")));
        assert!(!query.matches(&record(Protocol::Udp, [192, 168, 1, 2], "DNS")));
    }

    #[test]
    fn test_ip_filter_excludes_missing_address() {
        let query = RecordQuery {
            dst_ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
            ..Default::default()
        };
        assert!(!query.matches(&ClassifiedRecord::new(DecodedPacket::default(), "UNKNOWN")));
    }

    #[test]
    fn test_offset_and_validation() {
        let query = RecordQuery {
            page: 3,
            page_size: 10,
            ..Default::default()
        };
        assert_eq!(query.offset(), 20);

        let zero_page = RecordQuery {
            page: 0,
            ..Default::default()
        };
        assert!(matches!(zero_page.validate(), Err(StoreError::InvalidQuery(_))));

        let zero_size = RecordQuery {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_size.validate(), Err(StoreError::InvalidQuery(_))));
    }
}
