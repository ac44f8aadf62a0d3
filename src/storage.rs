//! Key-value storage port.
//!
//! Everything the application persists goes through [`KeyValueStore`]: a flat
//! string-to-string map with fallible `get`/`set`/`remove`, the same shape as
//! browser local storage. The stores take the port as an `Rc<dyn KeyValueStore>`
//! so tests can hand them an in-memory fake.
//!
//! Two implementations live here:
//! - [`MemoryStore`]: in-process map with optional quota and write fault injection
//! - [`FileStore`]: the whole key space in one JSON object on disk

use crate::error::{AppError, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default quota, matching the usual browser local storage limit.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Synchronous string key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Outcome of a write-through mutation.
///
/// `value` is the state after the mutation was applied in memory; `write`
/// reports whether it reached storage. Callers decide whether to keep `value`
/// when the write failed.
#[derive(Debug)]
#[must_use]
pub struct Committed<T> {
    pub value: T,
    pub write: Result<(), AppError>,
}

impl<T> Committed<T> {
    pub fn new(value: T, write: Result<(), AppError>) -> Self {
        Self { value, write }
    }

    pub fn is_persisted(&self) -> bool {
        self.write.is_ok()
    }

    /// Discard the in-memory value if the write failed.
    pub fn into_result(self) -> Result<T, AppError> {
        self.write.map(|()| self.value)
    }
}

/// Read and parse a JSON value, reporting absence and corruption distinctly.
pub fn try_read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, AppError> {
    let raw = store.get(key).map_err(|e| AppError::StorageReadCorrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AppError::StorageReadCorrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

/// Read a JSON value, recovering to the default on absent or corrupt data.
pub fn read_json_or_default<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> T {
    match try_read_json(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!("{}; recovering to empty", e);
            T::default()
        }
    }
}

/// Serialize and store a JSON value.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), AppError> {
    let raw = serde_json::to_string(value).map_err(|e| {
        AppError::write_failed(key, StorageError::Unavailable(format!("serialize: {}", e)))
    })?;
    store.set(key, &raw).map_err(|e| {
        tracing::error!("failed to write {}: {}", key, e);
        AppError::write_failed(key, e)
    })
}

/// Remove a key, mapping failure to a write error.
pub fn remove_key(store: &dyn KeyValueStore, key: &str) -> Result<(), AppError> {
    store.remove(key).map_err(|e| {
        tracing::error!("failed to remove {}: {}", key, e);
        AppError::write_failed(key, e)
    })
}

fn projected_size(map: &BTreeMap<String, String>, key: &str, value: &str) -> usize {
    let existing: usize = map
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
    existing + key.len() + value.len()
}

fn check_quota(
    map: &BTreeMap<String, String>,
    quota: Option<usize>,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    if let Some(limit) = quota {
        let needed = projected_size(map, key, value);
        if needed > limit {
            return Err(StorageError::QuotaExceeded { needed, limit });
        }
    }
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store used by tests and `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    quota: Option<usize>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Make every subsequent `set`/`remove` fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Raw access for tests that plant corrupt data.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        let mut entries = self.entries.borrow_mut();
        check_quota(&entries, self.quota, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Key space persisted as a single JSON object.
///
/// The file is read once at open; every write rewrites the whole file through
/// a temp file and rename. A single writer is assumed.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RefCell<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl FileStore {
    pub fn open(path: &Path, quota: Option<usize>) -> Result<Self, StorageError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    let backup = path.with_extension("json.corrupt");
                    tracing::warn!(
                        "storage file {} is corrupt ({}); moving it to {} and starting empty",
                        path.display(),
                        e,
                        backup.display()
                    );
                    std::fs::rename(path, &backup)?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: RefCell::new(entries),
            quota,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.borrow_mut();
        check_quota(&entries, self.quota, key, value)?;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&entries) {
            // Keep the map in line with what is on disk.
            match previous {
                Some(prev) => entries.insert(key.to_string(), prev),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.borrow_mut();
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.flush(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}
