// packages/engine/src/lib.rs
//! Nettap Engine Library
//!
//! In-process HTTP traffic capture: a tower layer that records every
//! request/response pair a client makes, stores the bodies on disk, writes a
//! human-readable session log and keeps an observable in-memory registry.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **context**: `CaptureContext`, owner of one capture session
//! - **interception**: admission filter, capture layer, redirects, registration
//! - **recording**: exchange records, body store, session log, registry, export
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use nettap_engine::{http_transport, CaptureContext, EngineConfig, SessionConfig};
//!
//! # fn main() -> nettap_engine::Result<()> {
//! let context = CaptureContext::new(EngineConfig::default())?;
//! context.start()?;
//!
//! let mut session = SessionConfig::default_session();
//! context.install(&mut session);
//! let client = session.wrap(http_transport());
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod context;
pub mod interception;
pub mod observability;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use context::CaptureContext;
pub use interception::{
    http_transport, CaptureLayer, CaptureService, FollowAll, RedirectPolicy, SessionConfig,
    SessionKind,
};
pub use recording::{Direction, ExchangeRecord, ExchangeRegistry, ExportFormat, Exporter, ShortType};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
