//! Downstream destination for classified records.

use async_trait::async_trait;
use packetlens_storage::{ClassifiedRecord, RecordStore, StoreError, StoredRecord};
use std::sync::Arc;

/// Receives every record the pipeline classifies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn accept(&self, record: ClassifiedRecord) -> Result<StoredRecord, StoreError>;
}

/// Sink that appends to a record store in-process.
#[derive(Clone)]
pub struct StoreSink {
    store: Arc<dyn RecordStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

#[async_trait]
impl RecordSink for StoreSink {
    async fn accept(&self, record: ClassifiedRecord) -> Result<StoredRecord, StoreError> {
        self.store.append(record).await
    }
}
