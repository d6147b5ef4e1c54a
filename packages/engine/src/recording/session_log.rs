// packages/engine/src/recording/session_log.rs
//! Human-readable session log
//!
//! Every completed exchange appends one block to a single text file. Appends
//! are serialized so blocks never interleave, and the file is created on the
//! first append.

use crate::recording::exchange::{display_time, ExchangeRecord, Headers, ResponseFacet};
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only session log file
pub struct SessionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the full block for a completed exchange
    pub fn append_exchange(&self, record: &ExchangeRecord) -> Result<()> {
        let mut block = format_request_entry(record);
        block.push_str(&format_response_entry(record));
        self.append(&block)
    }

    /// Append raw text, creating the file if it does not exist yet
    pub fn append(&self, text: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                EngineError::StorageFailed(format!("Failed to open session log {:?}: {}", self.path, e))
            })?;

        file.write_all(text.as_bytes()).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to append to session log: {}", e))
        })?;
        file.flush().map_err(|e| {
            EngineError::StorageFailed(format!("Failed to flush session log: {}", e))
        })?;

        debug!("Appended {} bytes to session log", text.len());
        Ok(())
    }

    /// Whole log contents, empty if nothing was logged yet
    pub fn read(&self) -> Result<String> {
        let _guard = self.write_lock.lock();
        match fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(EngineError::StorageFailed(format!(
                "Failed to read session log: {}",
                e
            ))),
        }
    }

    /// Remove the log file
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::StorageFailed(format!(
                "Failed to delete session log: {}",
                e
            ))),
        }
    }
}

fn write_headers(log: &mut String, headers: &Headers) {
    for (name, value) in headers {
        let _ = writeln!(log, "{}: {}", name, value);
    }
}

/// Request half of a log block
pub fn format_request_entry(record: &ExchangeRecord) -> String {
    let request = &record.request;
    let mut log = String::new();

    let _ = writeln!(log, "-------START REQUEST -  {} -------", request.url);
    let _ = writeln!(log, "[Request Method] {}", request.method);
    let _ = writeln!(log, "[Request Date] {}", request.date.to_rfc3339());
    let _ = writeln!(log, "[Request Time] {}", display_time(&request.date));
    if let Some(content_type) = &request.content_type {
        let _ = writeln!(log, "[Request Type] {}", content_type);
    }
    let _ = writeln!(log, "[Request Timeout] {}", request.timeout_display());
    log.push_str("[Request Headers]\n");
    write_headers(&mut log, &request.headers);
    let _ = writeln!(log, "[Request Body]\n {}", record.request_body());
    let _ = writeln!(log, "-------END REQUEST - {} -------\n", request.url);

    log
}

/// Response half of a log block
pub fn format_response_entry(record: &ExchangeRecord) -> String {
    let url = &record.request.url;
    let mut log = String::new();

    let _ = writeln!(log, "-------START RESPONSE -  {} -------", url);
    match &record.response {
        ResponseFacet::Received(data) => {
            let _ = writeln!(log, "[Response Status] {}", data.status);
            if let Some(content_type) = &data.content_type {
                let _ = writeln!(log, "[Response Type] {}", content_type);
            }
            let _ = writeln!(log, "[Response Date] {}", data.date.to_rfc3339());
            let _ = writeln!(log, "[Response Time] {}", display_time(&data.date));
            log.push_str("[Response Headers]\n");
            write_headers(&mut log, &data.headers);
            log.push('\n');
            let _ = writeln!(log, "[Response Body]\n {}", record.response_body());
        }
        ResponseFacet::Error { date } => {
            let _ = writeln!(log, "[Response Error] no response");
            let _ = writeln!(log, "[Response Date] {}", date.to_rfc3339());
        }
        ResponseFacet::Pending => {
            let _ = writeln!(log, "[Response Pending]");
        }
    }
    let _ = writeln!(log, "-------END RESPONSE - {} -------\n", url);

    log
}
