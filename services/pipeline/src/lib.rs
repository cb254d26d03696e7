//! PacketLens Pipeline - capture to record-store wiring
//!
//! This library connects the ingest and storage crates:
//!
//! - [`Classifier`] labels decoded packets with an ordered rule table
//! - [`Pipeline`] moves frames from a capture session through decode and
//!   classification into a [`RecordSink`]
//! - [`PacketService`] exposes every operation with plain inputs, for use
//!   by HTTP handlers or the `packetlens` binary
//!
//! # Example
//!
//! ```rust,no_run
//! use packetlens_pipeline::{AppConfig, PacketService, RecordFilter};
//! use packetlens_storage::InMemoryRecordStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let service = PacketService::new(&config, Arc::new(InMemoryRecordStore::from_config(&config.storage)));
//!
//!     service.replay_capture_file("capture.pcap").await?;
//!     let page = service.query_records(RecordFilter::default()).await?;
//!     println!("{} records", page.matched);
//!
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod orchestrator;
pub mod service;
pub mod sink;

// Re-export main types
pub use classifier::{classify, Classifier, Label, Rule, DEFAULT_RULES, LARGE_PACKET_THRESHOLD};
pub use config::{AppConfig, BackpressurePolicy, LoggingConfig, MetricsConfig, PipelineConfig};
pub use orchestrator::{Pipeline, PipelineError, PipelineStatus, ReplaySummary};
pub use service::{PacketService, RecordFilter, ServiceError};
pub use sink::{RecordSink, StoreSink};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::service::{PacketService, RecordFilter, ServiceError};
    pub use packetlens_ingest::{CaptureSession, DecodedPacket, Protocol};
    pub use packetlens_storage::{ClassifiedRecord, InMemoryRecordStore, RecordStore};
}
