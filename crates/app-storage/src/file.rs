//! JSON-file-backed key-value store.
//!
//! The mobile shell persists small flags and session state through an
//! AsyncStorage-style interface; on the native side that maps to a single
//! JSON object file. Reads and writes go through one Mutex so interleaved
//! read-modify-write cycles cannot lose a key.

use crate::{KeyValueStore, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key-value store persisted as a single JSON object file.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Create a store backed by the given file. The file and its parent
    /// directories are created lazily on first write.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StorageError::Encoding(e.to_string()))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(map).map_err(|e| StorageError::Encoding(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_map()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.read_map()?;
        let existed = map.remove(key).is_some();
        if existed {
            self.write_map(&map)?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_get_delete_round_trip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("prefs.json"));

        storage.set("alpha", "1").unwrap();
        assert_eq!(storage.get("alpha").unwrap(), Some("1".to_string()));
        assert!(storage.has("alpha").unwrap());

        assert!(storage.delete("alpha").unwrap());
        assert!(!storage.delete("alpha").unwrap());
        assert_eq!(storage.get("alpha").unwrap(), None);
    }

    #[test]
    fn test_get_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nope").join("prefs.json"));

        assert_eq!(storage.get("anything").unwrap(), None);
        assert!(!storage.has("anything").unwrap());
    }

    #[test]
    fn test_parent_dirs_created_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("prefs.json");
        let storage = FileStorage::new(path.clone());

        storage.set("k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        {
            let storage = FileStorage::new(path.clone());
            storage.set("persisted", "yes").unwrap();
        }

        let storage = FileStorage::new(path);
        assert_eq!(storage.get("persisted").unwrap(), Some("yes".to_string()));
    }

    #[test]
    fn test_corrupt_file_reports_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(path);
        assert!(matches!(
            storage.get("k"),
            Err(StorageError::Encoding(_))
        ));
    }
}
