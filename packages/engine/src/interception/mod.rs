// packages/engine/src/interception/mod.rs
//! HTTP interception layer
//!
//! Capture is installed as a tower layer around the transport a client
//! already uses. Nothing leaves the process, no proxy and no certificates:
//!
//! - **Admission**: capture switch, ignore rules, internal marker check
//! - **HTTP Interceptor**: replays admitted requests and records the exchange
//! - **Capture Body**: forwards response frames while keeping a copy
//! - **Redirect**: follow-up requests handed to the caller's policy
//! - **Registration**: session configurations capture is installed into
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌───────────┐
//! │    Client    │────►│ CaptureService │────►│ Transport │
//! └──────────────┘     └───────┬────────┘     └───────────┘
//!                              │ completed exchanges
//!                              ▼
//!                      Body Store / Session Log / Registry
//! ```

pub mod admission;
pub mod capture_body;
pub mod extensions;
pub mod http_interceptor;
pub mod redirect;
pub mod registration;

// Re-export commonly used types
pub use admission::{Admission, AdmissionFilter, InternalMarker, RejectReason};
pub use capture_body::CaptureBody;
pub use extensions::{BufferedBody, CacheStoragePolicy, RequestTimeout};
pub use http_interceptor::{
    http_transport, CaptureLayer, CaptureService, HttpTransport, Interceptor,
};
pub use redirect::{FollowAll, RedirectPolicy, SharedRedirectPolicy, MAX_REDIRECTS};
pub use registration::{SessionConfig, SessionKind};
