// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Loaded from an optional `nettap.toml` (or any format the `config` crate
//! understands) and overridden by `NETTAP__SECTION__KEY` environment
//! variables, e.g. `NETTAP__CAPTURE__ENABLED=true`.

use crate::interception::CacheStoragePolicy;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default configuration file stem
pub const DEFAULT_CONFIG_FILE: &str = "nettap";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "NETTAP";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capture switch, ignore lists and transport defaults
    pub capture: CaptureConfig,

    /// Body store and session log locations
    pub storage: StorageConfig,
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Turn capture on when the context starts
    pub enabled: bool,

    /// Exact URL prefixes that are never captured
    pub ignored_urls: Vec<String>,

    /// Regular expressions for URLs that are never captured
    pub ignored_regexes: Vec<String>,

    /// Cache storage policy handed to the caller with response headers
    pub cache_storage_policy: CacheStoragePolicy,

    /// Timeout applied to requests that do not carry their own (seconds)
    pub default_timeout_secs: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignored_urls: Vec::new(),
            ignored_regexes: Vec::new(),
            cache_storage_policy: CacheStoragePolicy::NotAllowed,
            default_timeout_secs: 60.0,
        }
    }
}

impl CaptureConfig {
    /// Negative values count as zero; values too large for a `Duration` are rejected
    pub fn default_timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.default_timeout_secs.max(0.0)).map_err(|e| {
            EngineError::ConfigError(format!(
                "Invalid capture.default_timeout_secs {}: {}",
                self.default_timeout_secs, e
            ))
        })
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding body files and the session log
    pub base_dir: PathBuf,

    /// Session log file name inside `base_dir`
    pub session_log_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("nettap"),
            session_log_name: "session.log".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn session_log_path(&self) -> PathBuf {
        self.base_dir.join(&self.session_log_name)
    }
}

impl EngineConfig {
    /// Load configuration from `nettap.*` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file stem plus the environment
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("capture.ignored_urls")
                    .with_list_parse_key("capture.ignored_regexes")
                    .try_parsing(true),
            )
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.capture.default_timeout()?;
        debug!("Loaded engine configuration: {:?}", engine_config);

        Ok(engine_config)
    }
}
