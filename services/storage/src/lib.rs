//! PacketLens Storage
//!
//! Append-only log of classified packet records with filtering, pagination,
//! aggregation, alerting and export.
//!
//! ## Architecture
//!
//! ```text
//!  ClassifiedRecord          RecordStore                 Readers
//! ┌──────────────┐  append  ┌──────────────┐  query     ┌──────────────┐
//! │ Pipeline /   │─────────▶│ record log   │──────────▶│ pages        │
//! │ collaborator │          │ (id, ts, …)  │ statistics│ statistics   │
//! └──────────────┘          └──────────────┘ alerts    │ alerts       │
//!                                  │         export    │ CSV / JSON   │
//!                                  ▼                   └──────────────┘
//!                               clear
//! ```
//!
//! [`RecordStore`] is the engine seam; [`InMemoryRecordStore`] is the engine
//! shipped with the workspace.

pub mod config;
pub mod error;
pub mod export;
pub mod query;
pub mod record;
pub mod stats;
pub mod store;

pub use config::StorageConfig;
pub use error::StoreError;
pub use export::{ExportFormat, ExportedData};
pub use query::{QueryResult, RecordQuery};
pub use record::{ClassifiedRecord, StoredRecord};
pub use stats::{Alert, Severity, Statistics};
pub use store::{InMemoryRecordStore, RecordStore};
