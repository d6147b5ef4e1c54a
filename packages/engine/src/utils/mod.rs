// packages/engine/src/utils/mod.rs
//! Common utilities: configuration and error types

pub mod config;
pub mod errors;

pub use config::{CaptureConfig, EngineConfig, StorageConfig};
pub use errors::{BoxError, EngineError, Result};
