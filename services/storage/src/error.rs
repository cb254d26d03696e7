use thiserror::Error;

/// Errors returned by record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Export failed: {0}")]
    Export(String),
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Export(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Export(e.to_string())
    }
}
