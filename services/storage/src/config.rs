use serde::Deserialize;

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Maximum number of records held; unbounded when absent
    #[serde(default)]
    pub max_records: Option<usize>,
    /// Maximum number of alerts returned
    #[serde(default = "default_alert_limit")]
    pub alert_limit: usize,
    /// Page size used when a query does not specify one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_alert_limit() -> usize {
    100
}

fn default_page_size() -> usize {
    25
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_records: None,
            alert_limit: default_alert_limit(),
            default_page_size: default_page_size(),
        }
    }
}
