//! Key-value stores backing the repository.
//!
//! Layout of a [`FileStore`] data directory:
//! ```text
//! {data-dir}/
//! ├── user-progress.json
//! ├── flashcard-schedules.json
//! └── flashcard-analytics.json
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt state under key '{key}': {reason}")]
    CorruptState { key: String, reason: String },

    #[error("Unsupported schema version {found} under key '{key}'")]
    UnsupportedVersion { key: String, found: u32 },

    #[error("Revision conflict under key '{key}': expected {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("Invalid store key: {0}")]
    InvalidKey(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Data directory not found")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Synchronous string-keyed blob storage.
///
/// Values are UTF-8 text. Missing keys read as `None`; removing a missing key
/// is not an error.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Write `value` only if the stored blob still equals `expected`
    /// (`None` meaning absent). Returns whether the write happened.
    fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool>;
}

/// Stores each key as `{key}.json` inside a directory.
///
/// Compare-and-set is atomic between users of the same `FileStore`. Separate
/// processes sharing a directory are not coordinated.
pub struct FileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a file store, creating the directory if needed
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|p| p.join("emt-study"))
            .ok_or(StorageError::DataDirNotFound)
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.data_dir.join(format!("{}.json", key)))
    }

    fn read(&self, path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, path)?;
        log::debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        self.read(&path)
    }

    /// Write using tmp file + rename so a crash never leaves half a blob
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.write(&path, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        if path.exists() {
            fs::remove_file(&path)?;
            log::debug!("Removed {:?}", path);
        }
        Ok(())
    }

    fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        let path = self.key_path(key)?;
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        if self.read(&path)?.as_deref() != expected {
            return Ok(false);
        }
        self.write(&path, value)?;
        Ok(true)
    }
}

/// In-process store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        if entries.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}

/// Keys become file names, so only `[a-z0-9_-]` is accepted.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("data")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_file_store_set_get_remove() {
        let (store, _temp) = create_test_store();

        assert!(store.get("user-progress").unwrap().is_none());

        store.set("user-progress", "{\"a\":1}").unwrap();
        assert_eq!(
            store.get("user-progress").unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(store.data_dir().join("user-progress.json").exists());
        assert!(!store.data_dir().join("user-progress.json.tmp").exists());

        store.remove("user-progress").unwrap();
        assert!(store.get("user-progress").unwrap().is_none());

        // Removing again is fine
        store.remove("user-progress").unwrap();
    }

    #[test]
    fn test_file_store_overwrites() {
        let (store, _temp) = create_test_store();
        store.set("flashcard-schedules", "first").unwrap();
        store.set("flashcard-schedules", "second").unwrap();
        assert_eq!(
            store.get("flashcard-schedules").unwrap().as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("Upper"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_stores_validate_keys_alike() {
        let (file_store, _temp) = create_test_store();
        let memory_store = MemoryStore::new();
        let stores: [&dyn DurableStore; 2] = [&file_store, &memory_store];

        for store in stores {
            assert!(matches!(store.get("../x"), Err(StorageError::InvalidKey(_))));
            assert!(matches!(store.set("../x", "v"), Err(StorageError::InvalidKey(_))));
            assert!(matches!(store.remove("../x"), Err(StorageError::InvalidKey(_))));
            assert!(matches!(
                store.compare_and_set("../x", None, "v"),
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn test_compare_and_set() {
        let (file_store, _temp) = create_test_store();
        let memory_store = MemoryStore::new();
        let stores: [&dyn DurableStore; 2] = [&file_store, &memory_store];

        for store in stores {
            assert!(store.compare_and_set("k", None, "one").unwrap());
            // Stale expectation: nothing written
            assert!(!store.compare_and_set("k", None, "two").unwrap());
            assert!(!store.compare_and_set("k", Some("zero"), "two").unwrap());
            assert_eq!(store.get("k").unwrap().as_deref(), Some("one"));

            assert!(store.compare_and_set("k", Some("one"), "two").unwrap());
            assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }
}
