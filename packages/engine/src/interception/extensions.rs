// packages/engine/src/interception/extensions.rs
//! Request/response extensions understood by the capture engine

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-request timeout covering the whole exchange (headers and body)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout(pub Duration);

/// Request body bytes buffered by an upstream layer
///
/// When a request reaches the engine with its body stream already drained,
/// the engine measures and persists this buffer instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedBody(pub Bytes);

/// Cache storage policy handed to the caller together with response headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStoragePolicy {
    Allowed,
    AllowedInMemoryOnly,
    #[default]
    NotAllowed,
}
