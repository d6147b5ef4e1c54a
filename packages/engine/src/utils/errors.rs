// packages/engine/src/utils/errors.rs
//! Engine error types
//!
//! Every fallible engine operation returns [`Result`]. Errors raised on the
//! capture path itself (body persistence, session log appends) are logged and
//! swallowed by the interception layer so the observed application never
//! sees them; only operator-facing calls surface them.

use thiserror::Error;

/// Boxed error used at the transport seam.
///
/// Transport errors are forwarded to the caller inside this box unchanged,
/// so callers can still `downcast_ref` to the concrete transport error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the capture engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Body store or session log I/O failed
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// An ignore pattern did not compile
    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// The exchange exceeded the timeout the request specified
    #[error("exchange timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The redirect policy kept following past the hop limit
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Export rendering failed
    #[error("export failed: {0}")]
    ExportFailed(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
