//! Record store interface and the in-memory engine.

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::export::{self, ExportFormat, ExportedData};
use crate::query::{QueryResult, RecordQuery};
use crate::record::{ClassifiedRecord, StoredRecord};
use crate::stats::{Alert, Statistics};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

/// Append-only record log with query and aggregation.
///
/// Appends are serialized and assign strictly increasing identifiers.
/// Reads observe a consistent snapshot of the log.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record, assigning its identifier and timestamp.
    async fn append(&self, record: ClassifiedRecord) -> Result<StoredRecord, StoreError>;

    /// Filtered, paginated view of the log, newest first.
    async fn query(&self, query: &RecordQuery) -> Result<QueryResult, StoreError>;

    async fn statistics(&self) -> Result<Statistics, StoreError>;

    /// Records labelled malicious or suspicious, newest first.
    async fn alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Encode the whole log, newest first.
    async fn export(&self, format: ExportFormat) -> Result<ExportedData, StoreError>;

    /// Empty the log. Returns the number of records removed.
    async fn clear(&self) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[derive(Debug)]
struct RecordLog {
    /// Ordered by id, which is also timestamp order
    records: Vec<StoredRecord>,
    next_id: u64,
}

/// Record store held in process memory.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    log: RwLock<RecordLog>,
    max_records: Option<usize>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self {
            log: RwLock::new(RecordLog {
                records: Vec::new(),
                next_id: 1,
            }),
            max_records: None,
        }
    }

    /// Create a store that rejects appends once `max_records` are held.
    pub fn with_capacity_limit(max_records: usize) -> Self {
        Self {
            max_records: Some(max_records),
            ..Self::new()
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_records: config.max_records,
            ..Self::new()
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    #[instrument(skip(self, record), fields(label = %record.label))]
    async fn append(&self, record: ClassifiedRecord) -> Result<StoredRecord, StoreError> {
        let mut log = self.log.write();

        if let Some(max) = self.max_records {
            if log.records.len() >= max {
                metrics::counter!("storage.append.rejected").increment(1);
                warn!(max_records = max, "Record store full, rejecting append");
                return Err(StoreError::StorageUnavailable(format!(
                    "record store full ({max} records)"
                )));
            }
        }

        // Keep timestamps non-decreasing even if the wall clock steps back
        let now = Utc::now();
        let timestamp = match log.records.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let stored = StoredRecord {
            id: log.next_id,
            timestamp,
            record,
        };
        log.next_id += 1;
        log.records.push(stored.clone());

        metrics::counter!("storage.records.appended").increment(1);
        debug!(id = stored.id, "Record appended");

        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &RecordQuery) -> Result<QueryResult, StoreError> {
        query.validate()?;

        let log = self.log.read();
        let offset = query.offset();
        let mut matched = 0usize;
        let mut records = Vec::with_capacity(query.page_size.min(log.records.len()));

        for stored in log.records.iter().rev() {
            if !query.matches(&stored.record) {
                continue;
            }
            if matched >= offset && records.len() < query.page_size {
                records.push(stored.clone());
            }
            matched += 1;
        }

        Ok(QueryResult {
            records,
            total: log.records.len() as u64,
            matched: matched as u64,
        })
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let log = self.log.read();
        Ok(Statistics::compute(&log.records))
    }

    async fn alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let log = self.log.read();
        Ok(log
            .records
            .iter()
            .rev()
            .filter_map(Alert::from_record)
            .take(limit)
            .collect())
    }

    #[instrument(skip(self))]
    async fn export(&self, format: ExportFormat) -> Result<ExportedData, StoreError> {
        let log = self.log.read();
        let data = export::encode(log.records.iter().rev(), format)?;
        info!(
            records = log.records.len(),
            bytes = data.bytes.len(),
            filename = data.filename,
            "Record log exported"
        );
        Ok(data)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<u64, StoreError> {
        let mut log = self.log.write();
        let removed = log.records.len() as u64;
        // next_id is kept so identifiers are never reused
        log.records.clear();

        metrics::counter!("storage.records.cleared").increment(removed);
        info!(removed = removed, "Record log cleared");

        Ok(removed)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.log.read().records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Severity;
    use packetlens_ingest::{DecodedPacket, Protocol};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn record(protocol: Protocol, src: [u8; 4], label: &str) -> ClassifiedRecord {
        ClassifiedRecord::new(
            DecodedPacket {
                src_ip: Some(Ipv4Addr::from(src)),
                dst_ip: Some(Ipv4Addr::new(10, 0, 0, 254)),
                protocol,
                src_port: Some(40000),
                dst_port: Some(80),
                length: 60,
                ..Default::default()
            },
            label,
        )
    }

    async fn seeded(labels: &[&str]) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        for (i, label) in labels.iter().enumerate() {
            let protocol = if i % 2 == 0 { Protocol::Tcp } else { Protocol::Udp };
            store
                .append(record(protocol, [192, 168, 0, i as u8], label))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_append_then_query_returns_newest_first() {
        let store = InMemoryRecordStore::new();
        let first = store.append(record(Protocol::Tcp, [1, 1, 1, 1], "UNKNOWN")).await.unwrap();
        let second = store.append(record(Protocol::Udp, [2, 2, 2, 2], "DNS")).await.unwrap();

        assert_eq!(first.id, 1);
        assert!(second.id > first.id);
        assert!(second.timestamp >= first.timestamp);

        let result = store.query(&RecordQuery::default()).await.unwrap();
        assert_eq!(result.records[0].id, second.id);
        assert_eq!(result.records[1].id, first.id);
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn test_total_ignores_filters() {
        let store = seeded(&["UNKNOWN", "DNS", "suspicious", "malicious", "UNKNOWN"]).await;

        let result = store
            .query(&RecordQuery {
                protocol: Some(Protocol::Udp),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.total, 5);
        assert_eq!(result.matched, 2);
        assert!(result.records.iter().all(|r| r.record.packet.protocol == Protocol::Udp));
    }

    #[tokio::test]
    async fn test_pagination_offsets() {
        let labels = vec!["UNKNOWN"; 7];
        let store = seeded(&labels).await;

        let page = |page, page_size| RecordQuery {
            page,
            page_size,
            ..Default::default()
        };

        let first = store.query(&page(1, 3)).await.unwrap();
        assert_eq!(first.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![7, 6, 5]);

        let third = store.query(&page(3, 3)).await.unwrap();
        assert_eq!(third.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(third.matched, 7);

        let beyond = store.query(&page(4, 3)).await.unwrap();
        assert!(beyond.records.is_empty());

        assert!(matches!(
            store.query(&page(0, 3)).await,
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_label_filters() {
        let store = seeded(&["Suspicious-scan", "MALICIOUS", "DNS", "malicious-and-suspicious"]).await;

        let suspicious = store
            .query(&RecordQuery {
                suspicious_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(suspicious.matched, 2);

        let both = store
            .query(&RecordQuery {
                suspicious_only: true,
                malicious_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(both.records.len(), 1);
        assert_eq!(both.records[0].record.label, "malicious-and-suspicious");
    }

    #[tokio::test]
    async fn test_statistics_counts_malicious() {
        let store = seeded(&["malicious", "UNKNOWN", "Malicious-C2", "suspicious", "DNS"]).await;

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.malicious_count, 2);
        assert_eq!(stats.suspicious_count, 1);
        assert_eq!(stats.unique_source_ips, 5);
        assert_eq!(stats.unique_destination_ips, 1);
        assert_eq!(stats.protocol_distribution["TCP"], 3);
    }

    #[tokio::test]
    async fn test_alerts_order_severity_and_limit() {
        let store = seeded(&["suspicious", "DNS", "malicious", "suspicious-2"]).await;

        let alerts = store.alerts(100).await.unwrap();
        assert_eq!(alerts.iter().map(|a| a.id).collect::<Vec<_>>(), vec![4, 3, 1]);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[1].severity, Severity::High);

        let limited = store.alerts(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, 4);
    }

    #[tokio::test]
    async fn test_export_newest_first() {
        let store = seeded(&["UNKNOWN", "DNS"]).await;

        let export = store.export(ExportFormat::from_name("CSV")).await.unwrap();
        let text = String::from_utf8(export.bytes).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert!(rows[0].starts_with("2,"));
        assert!(rows[1].starts_with("1,"));
        assert_eq!(export.filename, "packets.csv");
    }

    #[tokio::test]
    async fn test_clear_does_not_reuse_ids() {
        let store = seeded(&["UNKNOWN", "UNKNOWN", "UNKNOWN"]).await;

        assert_eq!(store.clear().await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.statistics().await.unwrap().total, 0);

        let next = store.append(record(Protocol::Tcp, [1, 2, 3, 4], "UNKNOWN")).await.unwrap();
        assert_eq!(next.id, 4);
    }

    #[tokio::test]
    async fn test_capacity_limit_rejects_appends() {
        let store = InMemoryRecordStore::with_capacity_limit(2);
        store.append(record(Protocol::Tcp, [1, 1, 1, 1], "A")).await.unwrap();
        store.append(record(Protocol::Tcp, [1, 1, 1, 2], "B")).await.unwrap();

        let err = store
            .append(record(Protocol::Tcp, [1, 1, 1, 3], "C"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
        assert_eq!(store.count().await.unwrap(), 2);

        // Clearing frees capacity
        store.clear().await.unwrap();
        assert_eq!(store.append(record(Protocol::Tcp, [1, 1, 1, 4], "D")).await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_unique_ids() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());

        let mut tasks = Vec::new();
        for t in 0..4u8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for i in 0..50u8 {
                    let stored = store
                        .append(record(Protocol::Udp, [10, t, 0, i], "UNKNOWN"))
                        .await
                        .unwrap();
                    ids.push(stored.id);
                }
                ids
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.extend(task.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&200));
    }
}
