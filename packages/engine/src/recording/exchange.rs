// packages/engine/src/recording/exchange.rs
//! Exchange records
//!
//! One [`ExchangeRecord`] describes a captured request/response pair. The
//! request facet is written once when the exchange starts; the response
//! facet only ever moves forward:
//!
//! ```text
//! Pending ──► Error      (transport failure, timeout)
//!    │
//!    └──────► Received   (headers + full body observed)
//! ```
//!
//! Bodies are not held in memory. The record keeps [`BodyHandle`]s into the
//! body store and re-reads them on demand.

use crate::recording::body_store::BodyHandle;
use crate::recording::content_type::{self, ShortType};
use crate::recording::registry::StatusFilter;
use chrono::{DateTime, Local, Utc};
use hyper::http::request::Parts;
use hyper::HeaderMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

/// Status reported while no response has been received
pub const NO_RESPONSE_STATUS: u16 = 999;

/// Process-unique exchange identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A header value: a single string or every value of a repeated header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    fn push(&mut self, value: String) {
        match self {
            HeaderValues::One(first) => {
                let first = std::mem::take(first);
                *self = HeaderValues::Many(vec![first, value]);
            }
            HeaderValues::Many(values) => values.push(value),
        }
    }
}

impl fmt::Display for HeaderValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValues::One(value) => f.write_str(value),
            HeaderValues::Many(values) => f.write_str(&values.join(", ")),
        }
    }
}

/// Headers keyed by canonical name, sorted for deterministic output
pub type Headers = BTreeMap<String, HeaderValues>;

/// Render a header name in canonical Title-Case (`content-type` → `Content-Type`)
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Convert an `http` header map into captured [`Headers`]
pub fn capture_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(canonical_header_name(name.as_str()))
            .and_modify(|existing| existing.push(value.clone()))
            .or_insert(HeaderValues::One(value));
    }
    headers
}

/// Cache policy the caller attached to a request
///
/// Carried as a request extension; the engine records it but never acts on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CachePolicy {
    #[default]
    UseProtocolCachePolicy,
    ReloadIgnoringLocalCacheData,
    ReloadIgnoringLocalAndRemoteCacheData,
    ReturnCacheDataElseLoad,
    ReturnCacheDataDontLoad,
    ReloadRevalidatingCacheData,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::UseProtocolCachePolicy => "UseProtocolCachePolicy",
            CachePolicy::ReloadIgnoringLocalCacheData => "ReloadIgnoringLocalCacheData",
            CachePolicy::ReloadIgnoringLocalAndRemoteCacheData => {
                "ReloadIgnoringLocalAndRemoteCacheData"
            }
            CachePolicy::ReturnCacheDataElseLoad => "ReturnCacheDataElseLoad",
            CachePolicy::ReturnCacheDataDontLoad => "ReturnCacheDataDontLoad",
            CachePolicy::ReloadRevalidatingCacheData => "ReloadRevalidatingCacheData",
        }
    }
}

/// Request half of an exchange
#[derive(Debug, Clone, Serialize)]
pub struct RequestFacet {
    pub url: String,
    pub host: Option<String>,
    pub query_items: Vec<(String, String)>,
    pub method: String,
    pub cache_policy: CachePolicy,
    pub timeout: Duration,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub body_length: usize,
    pub body: Option<BodyHandle>,
    pub date: DateTime<Utc>,
    pub curl: String,
}

impl RequestFacet {
    /// Build the request facet from request parts and the fully read body
    pub fn from_parts(
        parts: &Parts,
        body: &[u8],
        cache_policy: CachePolicy,
        timeout: Duration,
    ) -> Self {
        let url = parts.uri.to_string();
        let headers = capture_headers(&parts.headers);
        let content_type = headers.get("Content-Type").map(|v| v.to_string());
        let method = parts.method.as_str().to_string();
        let curl = curl_command(&url, &method, &headers, body);

        Self {
            host: parts.uri.host().map(str::to_string),
            query_items: query_items(parts.uri.query()),
            url,
            method,
            cache_policy,
            timeout,
            headers,
            content_type,
            body_length: body.len(),
            body: None,
            date: Utc::now(),
            curl,
        }
    }

    /// Timeout in seconds as displayed in logs (`60.0`)
    pub fn timeout_display(&self) -> String {
        format!("{:?}", self.timeout.as_secs_f64())
    }
}

/// Response half of a successfully completed exchange
#[derive(Debug, Clone, Serialize)]
pub struct ResponseData {
    pub status: u16,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub short_type: ShortType,
    pub body_length: usize,
    pub body: Option<BodyHandle>,
    pub date: DateTime<Utc>,
}

impl ResponseData {
    pub fn new(status: u16, headers: Headers) -> Self {
        let content_type = headers
            .get("Content-Type")
            .map(|v| content_type::mime_type(&v.to_string()).to_string());
        let short_type = content_type
            .as_deref()
            .map(content_type::classify)
            .unwrap_or_default();

        Self {
            status,
            headers,
            content_type,
            short_type,
            body_length: 0,
            body: None,
            date: Utc::now(),
        }
    }
}

/// Response facet state
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResponseFacet {
    Pending,
    Error { date: DateTime<Utc> },
    Received(ResponseData),
}

/// One captured request/response pair
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    pub id: ExchangeId,
    pub request: RequestFacet,
    pub response: ResponseFacet,
    /// Seconds between issue and completion
    pub elapsed: Option<f64>,
    #[serde(skip)]
    issued_at: Instant,
}

impl ExchangeRecord {
    pub fn new(request: RequestFacet) -> Self {
        Self {
            id: ExchangeId::new(),
            request,
            response: ResponseFacet::Pending,
            elapsed: None,
            issued_at: Instant::now(),
        }
    }

    /// Mark the exchange as failed. Only valid from `Pending`.
    pub fn mark_error(&mut self) -> bool {
        if !matches!(self.response, ResponseFacet::Pending) {
            warn!("Ignoring error transition for settled exchange {}", self.id);
            return false;
        }
        self.response = ResponseFacet::Error { date: Utc::now() };
        true
    }

    /// Attach the response. Only valid from `Pending`.
    pub fn set_response(&mut self, mut data: ResponseData) -> bool {
        if !matches!(self.response, ResponseFacet::Pending) {
            warn!("Ignoring response transition for settled exchange {}", self.id);
            return false;
        }
        data.date = Utc::now();
        self.elapsed = Some(self.issued_at.elapsed().as_secs_f64());
        self.response = ResponseFacet::Received(data);
        true
    }

    pub fn response_data(&self) -> Option<&ResponseData> {
        match &self.response {
            ResponseFacet::Received(data) => Some(data),
            _ => None,
        }
    }

    pub fn response_date(&self) -> Option<DateTime<Utc>> {
        match &self.response {
            ResponseFacet::Pending => None,
            ResponseFacet::Error { date } => Some(*date),
            ResponseFacet::Received(data) => Some(data.date),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.response_data()
            .map(|data| data.status)
            .unwrap_or(NO_RESPONSE_STATUS)
    }

    pub fn short_type(&self) -> ShortType {
        self.response_data()
            .map(|data| data.short_type)
            .unwrap_or_default()
    }

    pub fn no_response(&self) -> bool {
        self.response_data().is_none()
    }

    pub fn is_successful(&self) -> bool {
        self.response_data().map_or(false, |data| data.status < 400)
    }

    /// Status class the viewer filters on, `None` without a response
    pub fn status_class(&self) -> Option<StatusFilter> {
        let status = self.response_data()?.status;
        Some(match status {
            0..=299 => StatusFilter::Success,
            300..=399 => StatusFilter::Redirect,
            _ => StatusFilter::Error,
        })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed.map(Duration::from_secs_f64)
    }

    /// Persisted request body, pretty-printed for its content type
    pub fn request_body(&self) -> String {
        self.request
            .body
            .as_ref()
            .map(|handle| handle.read_pretty(self.request.content_type.as_deref()))
            .unwrap_or_default()
    }

    /// Persisted response body, pretty-printed for its content type
    pub fn response_body(&self) -> String {
        self.response_data()
            .and_then(|data| {
                data.body
                    .as_ref()
                    .map(|handle| handle.read_pretty(data.content_type.as_deref()))
            })
            .unwrap_or_default()
    }
}

/// Wall-clock time as `H:MM` in local time
pub fn display_time(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%-H:%M").to_string()
}

/// Wall-clock time as `H:MM:SS` in local time
pub fn display_time_seconds(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%-H:%M:%S").to_string()
}

fn query_items(query: Option<&str>) -> Vec<(String, String)> {
    query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Double-quote `text` for a POSIX shell, escaping what stays special inside
fn shell_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Equivalent `curl` invocation for a request
///
/// `curl "<url>" -X <METHOD> -H "<Name>: <value>"... [-d "<body>"]`, headers in
/// name order, body only when non-empty UTF-8.
pub fn curl_command(url: &str, method: &str, headers: &Headers, body: &[u8]) -> String {
    let mut command = vec![format!("curl {}", shell_quote(url))];
    command.push(format!("-X {}", method));

    for (name, value) in headers {
        command.push(format!("-H {}", shell_quote(&format!("{}: {}", name, value))));
    }

    if !body.is_empty() {
        if let Ok(text) = std::str::from_utf8(body) {
            command.push(format!("-d {}", shell_quote(text)));
        }
    }

    command.join(" ")
}
