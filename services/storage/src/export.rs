//! Record log export.

use crate::error::StoreError;
use crate::record::StoredRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;

/// Column order of the CSV export.
pub const CSV_HEADER: [&str; 9] = [
    "id",
    "timestamp",
    "src_ip",
    "dst_ip",
    "src_port",
    "dst_port",
    "protocol",
    "length",
    "label",
];

/// Export encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// `csv` in any case selects CSV; every other name selects JSON.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("csv") {
            ExportFormat::Csv
        } else {
            ExportFormat::Json
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "packets.csv",
            ExportFormat::Json => "packets.json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

/// An encoded export with its download hints.
#[derive(Debug, Clone)]
pub struct ExportedData {
    pub format: ExportFormat,
    pub filename: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: u64,
    timestamp: DateTime<Utc>,
    src_ip: Option<Ipv4Addr>,
    dst_ip: Option<Ipv4Addr>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    protocol: &'static str,
    length: usize,
    label: &'a str,
}

impl<'a> From<&'a StoredRecord> for CsvRow<'a> {
    fn from(stored: &'a StoredRecord) -> Self {
        let packet = &stored.record.packet;
        Self {
            id: stored.id,
            timestamp: stored.timestamp,
            src_ip: packet.src_ip,
            dst_ip: packet.dst_ip,
            src_port: packet.src_port,
            dst_port: packet.dst_port,
            protocol: packet.protocol.as_str(),
            length: packet.length,
            label: &stored.record.label,
        }
    }
}

/// Encode `records` (already in export order).
pub fn encode<'a, I>(records: I, format: ExportFormat) -> Result<ExportedData, StoreError>
where
    I: IntoIterator<Item = &'a StoredRecord>,
{
    let bytes = match format {
        ExportFormat::Csv => {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(Vec::new());
            writer.write_record(CSV_HEADER)?;
            for stored in records {
                writer.serialize(CsvRow::from(stored))?;
            }
            writer
                .into_inner()
                .map_err(|e| StoreError::Export(e.to_string()))?
        }
        ExportFormat::Json => {
            let records: Vec<&StoredRecord> = records.into_iter().collect();
            serde_json::to_vec_pretty(&records)?
        }
    };

    Ok(ExportedData {
        format,
        filename: format.filename(),
        content_type: format.content_type(),
        bytes,
    })
}
