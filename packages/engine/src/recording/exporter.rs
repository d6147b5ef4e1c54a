// packages/engine/src/recording/exporter.rs
//! Export captured exchanges
//!
//! Supports:
//! - JSON (the records as captured)
//! - HAR (HTTP Archive 1.2)
//! - Text (the session log block format)

use crate::recording::exchange::{ExchangeRecord, Headers};
use crate::recording::session_log::{format_request_entry, format_response_entry};
use crate::utils::errors::{EngineError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy)]
pub enum ExportFormat {
    /// JSON format
    Json,

    /// HAR (HTTP Archive) format
    Har,

    /// Plain text, same layout as the session log
    Text,
}

/// Exporter for exchange snapshots
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    /// Create a new exporter
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export records to string
    pub fn export(&self, records: &[Arc<ExchangeRecord>]) -> Result<String> {
        debug!("Exporting {} exchanges to {:?} format", records.len(), self.format);

        match self.format {
            ExportFormat::Json => self.export_json(records),
            ExportFormat::Har => self.export_har(records),
            ExportFormat::Text => Ok(self.export_text(records)),
        }
    }

    fn export_json(&self, records: &[Arc<ExchangeRecord>]) -> Result<String> {
        let records: Vec<&ExchangeRecord> = records.iter().map(|r| r.as_ref()).collect();
        serde_json::to_string_pretty(&records).map_err(|e| {
            EngineError::ExportFailed(format!("JSON serialization error: {}", e))
        })
    }

    fn export_har(&self, records: &[Arc<ExchangeRecord>]) -> Result<String> {
        let har = HarDocument {
            log: HarLog {
                version: "1.2".to_string(),
                creator: HarCreator {
                    name: "nettap".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: records.iter().map(|r| har_entry(r)).collect(),
            },
        };

        serde_json::to_string_pretty(&har).map_err(|e| {
            EngineError::ExportFailed(format!("HAR serialization error: {}", e))
        })
    }

    fn export_text(&self, records: &[Arc<ExchangeRecord>]) -> String {
        records
            .iter()
            .map(|r| format_request_entry(r) + &format_response_entry(r))
            .collect()
    }
}

fn har_headers(headers: &Headers) -> Vec<HarNameValue> {
    headers
        .iter()
        .map(|(name, value)| HarNameValue {
            name: name.clone(),
            value: value.to_string(),
        })
        .collect()
}

fn har_entry(record: &ExchangeRecord) -> HarEntry {
    let request = &record.request;
    let response = record.response_data();

    HarEntry {
        started_date_time: request.date.to_rfc3339(),
        time: record.elapsed.unwrap_or(0.0) * 1000.0,
        request: HarRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            http_version: "HTTP/1.1".to_string(),
            headers: har_headers(&request.headers),
            query_string: request
                .query_items
                .iter()
                .map(|(name, value)| HarNameValue {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            body_size: request.body_length as i64,
        },
        response: HarResponse {
            status: record.status_code(),
            http_version: "HTTP/1.1".to_string(),
            headers: response.map(|r| har_headers(&r.headers)).unwrap_or_default(),
            content: HarContent {
                size: response.map(|r| r.body_length as i64).unwrap_or(-1),
                mime_type: response
                    .and_then(|r| r.content_type.clone())
                    .unwrap_or_default(),
                text: record.response_body(),
            },
            body_size: response.map(|r| r.body_length as i64).unwrap_or(-1),
        },
    }
}

// HAR format structures
#[derive(Serialize)]
struct HarDocument {
    log: HarLog,
}

#[derive(Serialize)]
struct HarLog {
    version: String,
    creator: HarCreator,
    entries: Vec<HarEntry>,
}

#[derive(Serialize)]
struct HarCreator {
    name: String,
    version: String,
}

#[derive(Serialize)]
struct HarNameValue {
    name: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry {
    started_date_time: String,
    time: f64,
    request: HarRequest,
    response: HarResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest {
    method: String,
    url: String,
    http_version: String,
    headers: Vec<HarNameValue>,
    query_string: Vec<HarNameValue>,
    body_size: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarResponse {
    status: u16,
    http_version: String,
    headers: Vec<HarNameValue>,
    content: HarContent,
    body_size: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarContent {
    size: i64,
    mime_type: String,
    text: String,
}
