// packages/engine/src/recording/body_store.rs
//! Body store for captured request/response payloads
//!
//! Each body is written once to its own file under the session directory and
//! addressed by `(exchange id, direction)`. Records only keep a
//! [`BodyHandle`]; the text is re-read whenever somebody asks for it.
//!
//! ```text
//! <base_dir>/
//! ├─ request_body_<id>
//! ├─ response_body_<id>
//! └─ session.log
//! ```

use crate::recording::content_type::{self, ShortType};
use crate::recording::exchange::ExchangeId;
use crate::utils::errors::{EngineError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which half of the exchange a body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    fn file_prefix(&self) -> &'static str {
        match self {
            Direction::Request => "request_body",
            Direction::Response => "response_body",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// Reference to a persisted body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BodyHandle {
    path: PathBuf,
}

impl BodyHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted text, `None` if the file is gone or unreadable
    pub fn read(&self) -> Option<String> {
        match fs::read(&self.path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!("Failed to load body from {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Read and pretty-print for the given content type, empty on failure
    pub fn read_pretty(&self, content_type: Option<&str>) -> String {
        self.read()
            .map(|raw| content_type::pretty_print(&raw, content_type))
            .unwrap_or_default()
    }
}

/// Encode raw body bytes into the text that gets persisted
///
/// Images become base64; everything else must be valid UTF-8 or nothing is
/// persisted.
pub fn encode_body(bytes: &[u8], short_type: ShortType) -> Option<String> {
    if short_type == ShortType::Image {
        return Some(BASE64.encode(bytes));
    }
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

/// Append-only body persistence for one capture session
pub struct BodyStore {
    base_dir: PathBuf,
    index: DashMap<(ExchangeId, Direction), BodyHandle>,
}

impl BodyStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            base_dir: base_dir.into(),
            index: DashMap::new(),
        };
        store.ensure_dir()?;

        debug!("Body store rooted at {:?}", store.base_dir);
        Ok(store)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            EngineError::StorageFailed(format!(
                "Failed to create body directory {:?}: {}",
                self.base_dir, e
            ))
        })
    }

    fn path_for(&self, id: &ExchangeId, direction: Direction) -> PathBuf {
        self.base_dir
            .join(format!("{}_{}", direction.file_prefix(), id))
    }

    /// Persist a body. Each `(id, direction)` may be written once.
    pub fn write(&self, id: &ExchangeId, direction: Direction, text: &str) -> Result<BodyHandle> {
        match self.index.entry((id.clone(), direction)) {
            Entry::Occupied(_) => Err(EngineError::StorageFailed(format!(
                "{} body for {} already written",
                direction, id
            ))),
            Entry::Vacant(slot) => {
                let path = self.path_for(id, direction);
                let mut file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map_err(|e| {
                        let reason = if e.kind() == ErrorKind::AlreadyExists {
                            "already exists".to_string()
                        } else {
                            e.to_string()
                        };
                        EngineError::StorageFailed(format!(
                            "Failed to create body file {:?}: {}",
                            path, reason
                        ))
                    })?;

                file.write_all(text.as_bytes()).map_err(|e| {
                    EngineError::StorageFailed(format!("Failed to write body file {:?}: {}", path, e))
                })?;

                debug!("Wrote {} body for {} ({} bytes)", direction, id, text.len());

                let handle = BodyHandle { path };
                slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn handle(&self, id: &ExchangeId, direction: Direction) -> Option<BodyHandle> {
        self.index
            .get(&(id.clone(), direction))
            .map(|entry| entry.value().clone())
    }

    /// Raw persisted text, `None` if nothing was persisted
    pub fn read(&self, id: &ExchangeId, direction: Direction) -> Option<String> {
        self.handle(id, direction).and_then(|handle| handle.read())
    }

    /// Persisted text pretty-printed for `content_type`, empty if absent
    pub fn body_text(&self, id: &ExchangeId, direction: Direction, content_type: Option<&str>) -> String {
        self.handle(id, direction)
            .map(|handle| handle.read_pretty(content_type))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Delete one body. Returns `false` if nothing was stored for it.
    pub fn remove(&self, id: &ExchangeId, direction: Direction) -> bool {
        match self.index.remove(&(id.clone(), direction)) {
            Some((_, handle)) => {
                delete_file(handle.path());
                true
            }
            None => false,
        }
    }

    /// Delete every body written through this store
    pub fn clear(&self) {
        let keys: Vec<_> = self.index.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.index.remove(&key) {
                delete_file(handle.path());
            }
        }
    }

    /// Wipe the whole directory (including leftovers from earlier runs) and recreate it
    pub fn reset(&self) -> Result<()> {
        self.index.clear();

        if self.base_dir.exists() {
            fs::remove_dir_all(&self.base_dir).map_err(|e| {
                EngineError::StorageFailed(format!(
                    "Failed to delete body directory {:?}: {}",
                    self.base_dir, e
                ))
            })?;
        }
        self.ensure_dir()?;

        info!("Body store reset at {:?}", self.base_dir);
        Ok(())
    }
}

fn delete_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to delete body file {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, BodyStore) {
        let dir = tempdir().unwrap();
        let store = BodyStore::new(dir.path().join("bodies")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_dir, store) = store();
        let id = ExchangeId::new();

        let handle = store.write(&id, Direction::Response, "{\"id\":1}").unwrap();
        assert!(handle.path().exists());

        assert_eq!(store.read(&id, Direction::Response).as_deref(), Some("{\"id\":1}"));
        assert_eq!(
            store.body_text(&id, Direction::Response, Some("application/json")),
            "{\n  \"id\": 1\n}"
        );
        assert!(store.read(&id, Direction::Request).is_none());
        assert_eq!(store.body_text(&id, Direction::Request, None), "");
    }

    #[test]
    fn test_write_once_per_direction() {
        let (_dir, store) = store();
        let id = ExchangeId::new();

        store.write(&id, Direction::Request, "first").unwrap();
        let second = store.write(&id, Direction::Request, "second");
        assert!(matches!(second, Err(EngineError::StorageFailed(_))));
        assert_eq!(store.read(&id, Direction::Request).as_deref(), Some("first"));

        store.write(&id, Direction::Response, "other").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clear_deletes_files() {
        let (_dir, store) = store();
        let id = ExchangeId::new();
        let handle = store.write(&id, Direction::Request, "body").unwrap();

        store.clear();

        assert!(store.is_empty());
        assert!(!handle.path().exists());
        assert_eq!(store.body_text(&id, Direction::Request, None), "");
    }

    #[test]
    fn test_remove_single_body() {
        let (_dir, store) = store();
        let id = ExchangeId::new();
        let request = store.write(&id, Direction::Request, "req").unwrap();
        store.write(&id, Direction::Response, "res").unwrap();

        assert!(store.remove(&id, Direction::Request));
        assert!(!store.remove(&id, Direction::Request));

        assert!(!request.path().exists());
        assert!(store.read(&id, Direction::Request).is_none());
        assert_eq!(store.read(&id, Direction::Response).as_deref(), Some("res"));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (_dir, store) = store();
        let id = ExchangeId::new();
        let handle = store.write(&id, Direction::Response, "gone").unwrap();
        fs::remove_file(handle.path()).unwrap();

        assert_eq!(handle.read_pretty(None), "");
    }

    #[test]
    fn test_reset_removes_stale_files() {
        let (_dir, store) = store();
        let stale = store.base_dir().join("response_body_old");
        fs::write(&stale, "old").unwrap();

        store.reset().unwrap();

        assert!(store.base_dir().exists());
        assert!(!stale.exists());
    }

    #[test]
    fn test_encode_body() {
        assert_eq!(encode_body(b"hello", ShortType::Other).as_deref(), Some("hello"));
        assert_eq!(encode_body(&[0x89, 0x50], ShortType::Image).as_deref(), Some("iVA="));
        assert!(encode_body(&[0xff, 0xfe], ShortType::Json).is_none());
    }
}
