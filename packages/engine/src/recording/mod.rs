// packages/engine/src/recording/mod.rs
//! Exchange recording and storage
//!
//! This module holds everything that happens once bytes have been observed:
//!
//! - **Exchange**: the per-exchange record and its request/response facets
//! - **Content Type**: short-type classification and JSON pretty-printing
//! - **Body Store**: write-once body files addressed by exchange and direction
//! - **Session Log**: append-only human-readable log of completed exchanges
//! - **Registry**: in-memory collection with full-snapshot subscriptions
//! - **Exporter**: JSON, HAR and text renderings of a snapshot
//!
//! # Architecture
//!
//! ```text
//! Interception Engine ──► Body Store (request/response bodies)
//!          │
//!          ├────────────► Session Log (one block per exchange)
//!          │
//!          └────────────► Exchange Registry ──► subscribers (full snapshot)
//! ```

pub mod body_store;
pub mod content_type;
pub mod exchange;
pub mod exporter;
pub mod registry;
pub mod session_log;

// Re-export commonly used types
pub use body_store::{BodyHandle, BodyStore, Direction};
pub use content_type::{classify, ShortType};
pub use exchange::{
    CachePolicy, ExchangeId, ExchangeRecord, HeaderValues, Headers, RequestFacet, ResponseData,
    ResponseFacet,
};
pub use exporter::{ExportFormat, Exporter};
pub use registry::{ExchangeRegistry, Preferences, SortOrder, StatusFilter, SubscriptionId};
pub use session_log::SessionLog;
