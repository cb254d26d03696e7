//! Transport-agnostic entry points.
//!
//! Every operation takes plain values (strings, base64 text, paths) and
//! validates them here, so an HTTP handler or a CLI command only has to
//! map requests onto these calls.

use crate::classifier::{Classifier, Label};
use crate::config::AppConfig;
use crate::orchestrator::{Pipeline, PipelineError, PipelineStatus, ReplaySummary};
use crate::sink::StoreSink;
use packetlens_ingest::{
    decode_base64, list_interfaces, CaptureError, CaptureSession, DecodedPacket, Protocol,
    StartOutcome,
};
use packetlens_storage::query::DEFAULT_PAGE;
use packetlens_storage::{
    Alert, ClassifiedRecord, ExportFormat, ExportedData, QueryResult, RecordQuery, RecordStore,
    Statistics, StorageConfig, StoreError, StoredRecord,
};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors surfaced to callers of [`PacketService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl From<PipelineError> for ServiceError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Capture(e) => ServiceError::Capture(e),
            other => ServiceError::Pipeline(other.to_string()),
        }
    }
}

/// Raw query parameters as a caller supplies them.
///
/// Empty strings count as absent, which is how form and query-string
/// parameters usually arrive.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub protocol: Option<String>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub suspicious_only: bool,
    pub malicious_only: bool,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// Facade over the pipeline and the record store.
pub struct PacketService {
    pipeline: Pipeline,
    store: Arc<dyn RecordStore>,
    storage: StorageConfig,
}

impl PacketService {
    /// Service capturing from real interfaces.
    pub fn new(config: &AppConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::with_session(CaptureSession::new(config.capture.clone()), config, store)
    }

    /// Service driving the given capture session.
    pub fn with_session(
        session: CaptureSession,
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let sink = Arc::new(StoreSink::new(store.clone()));
        let pipeline = Pipeline::new(session, Classifier::default(), sink, config.pipeline.clone());

        Self {
            pipeline,
            store,
            storage: config.storage.clone(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn start_capture(&self, interface: &str) -> Result<StartOutcome, ServiceError> {
        let interface = interface.trim();
        if interface.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "interface name must not be empty".to_string(),
            ));
        }
        Ok(self.pipeline.start_capture(interface).await?)
    }

    /// Returns `false` when nothing was capturing.
    pub async fn stop_capture(&self) -> Result<bool, ServiceError> {
        Ok(self.pipeline.stop_capture().await?)
    }

    pub fn capture_status(&self) -> PipelineStatus {
        self.pipeline.status()
    }

    pub fn list_interfaces(&self) -> Vec<String> {
        list_interfaces()
    }

    pub async fn replay_capture_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ReplaySummary, ServiceError> {
        Ok(self.pipeline.replay_file(path).await?)
    }

    /// Decode a base64-encoded Ethernet frame.
    pub fn decode_frame(&self, encoded: &str) -> Result<DecodedPacket, ServiceError> {
        decode_base64(encoded.trim())
            .map_err(|e| ServiceError::InvalidArgument(format!("invalid base64 frame: {}", e)))
    }

    pub fn classify(&self, packet: &DecodedPacket) -> Label {
        self.pipeline.classifier().classify(packet)
    }

    pub async fn store_record(&self, record: ClassifiedRecord) -> Result<StoredRecord, ServiceError> {
        Ok(self.store.append(record).await?)
    }

    #[instrument(skip(self))]
    pub async fn query_records(&self, filter: RecordFilter) -> Result<QueryResult, ServiceError> {
        let query = self.build_query(filter)?;
        Ok(self.store.query(&query).await?)
    }

    pub async fn statistics(&self) -> Result<Statistics, ServiceError> {
        Ok(self.store.statistics().await?)
    }

    /// Most recent alerts, up to the configured limit.
    pub async fn alerts(&self) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.store.alerts(self.storage.alert_limit).await?)
    }

    /// `csv` (any case) exports CSV; any other name exports JSON.
    pub async fn export(&self, format: &str) -> Result<ExportedData, ServiceError> {
        Ok(self.store.export(ExportFormat::from_name(format)).await?)
    }

    pub async fn clear_all(&self) -> Result<u64, ServiceError> {
        let cleared = self.store.clear().await?;
        info!(cleared, "Record log cleared");
        Ok(cleared)
    }

    fn build_query(&self, filter: RecordFilter) -> Result<RecordQuery, ServiceError> {
        let protocol = present(filter.protocol)
            .map(|value| {
                value.parse::<Protocol>().map_err(|_| {
                    ServiceError::InvalidArgument(format!("unknown protocol: {}", value))
                })
            })
            .transpose()?;

        let query = RecordQuery {
            protocol,
            src_ip: parse_ip("src_ip", filter.src_ip)?,
            dst_ip: parse_ip("dst_ip", filter.dst_ip)?,
            suspicious_only: filter.suspicious_only,
            malicious_only: filter.malicious_only,
            page: filter.page.unwrap_or(DEFAULT_PAGE),
            page_size: filter.page_size.unwrap_or(self.storage.default_page_size),
        };

        query
            .validate()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        Ok(query)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_ip(field: &str, value: Option<String>) -> Result<Option<Ipv4Addr>, ServiceError> {
    present(value)
        .map(|value| {
            value.parse::<Ipv4Addr>().map_err(|_| {
                ServiceError::InvalidArgument(format!("{} is not an IPv4 address: {}", field, value))
            })
        })
        .transpose()
}
