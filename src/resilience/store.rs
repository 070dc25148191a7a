//! Durable key/value storage for scheduler state.

use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Env var naming the directory used by [`FileStore::from_env`].
pub const STATE_DIR_ENV: &str = "AI_RELAY_STATE_DIR";

/// Minimal string key/value persistence.
///
/// Implementations must be cheap enough to call on every tracker mutation.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<bool>;
    fn name(&self) -> &'static str;
}

/// In-process store; state does not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(key).is_some())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a temporary sibling and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `AI_RELAY_STATE_DIR`, `None` when unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(STATE_DIR_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn storage_error(&self, op: &str, key: &str, e: std::io::Error) -> Error {
        Error::storage_with_context(
            format!("{} failed: {}", op, e),
            ErrorContext::new()
                .with_field_path(key)
                .with_details(self.dir.display().to_string())
                .with_source("file_store"),
        )
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.storage_error("read", key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.storage_error("mkdir", key, e))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| self.storage_error("write", key, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| self.storage_error("rename", key, e))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.storage_error("remove", key, e)),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
