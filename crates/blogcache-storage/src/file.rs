use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::adapter::StorageAdapter;
use crate::error::StorageError;

const EXTENSION: &str = ".json";
const TEMP_EXTENSION: &str = ".tmp";

/// Durable storage with one file per key.
///
/// File names are the URL-encoded key plus `.json`. Writes go to a temp
/// file first and are renamed into place, so readers never see a partial
/// value.
#[derive(Debug)]
pub struct FileStorage {
    name: String,
    root: PathBuf,
    quota_bytes: Option<usize>,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io("durable", e))?;
        debug!("Opened file storage at {}", root.display());

        Ok(Self {
            name: "durable".to_string(),
            root,
            quota_bytes: None,
            write_lock: Mutex::new(()),
        })
    }

    /// Sets the adapter name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rejects writes that would grow the store past `quota_bytes`.
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Directory holding the entries.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{EXTENSION}", urlencoding::encode(key)))
    }

    fn io_error(&self, err: std::io::Error) -> StorageError {
        if err.kind() == ErrorKind::PermissionDenied {
            StorageError::unavailable(&self.name, err.to_string())
        } else {
            StorageError::io(&self.name, err)
        }
    }

    /// Bytes used by every key except `skip`.
    fn used_bytes_except(&self, skip: &str) -> Result<usize, StorageError> {
        let mut total = 0;
        for key in self.keys()? {
            if key == skip {
                continue;
            }
            let len = match fs::metadata(self.path_for(&key)) {
                Ok(meta) => meta.len() as usize,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(self.io_error(e)),
            };
            total += key.len() + len;
        }
        Ok(total)
    }
}

impl StorageAdapter for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();

        if let Some(limit) = self.quota_bytes {
            let needed = self.used_bytes_except(key)? + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    storage: self.name.clone(),
                    needed,
                    limit,
                });
            }
        }

        let path = self.path_for(key);
        let temp = self
            .root
            .join(format!("{}{TEMP_EXTENSION}", urlencoding::encode(key)));
        fs::write(&temp, value).map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &path).map_err(|e| self.io_error(e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let dir = fs::read_dir(&self.root).map_err(|e| self.io_error(e))?;
        let mut keys = Vec::new();

        for item in dir {
            let item = item.map_err(|e| self.io_error(e))?;
            let file_name = item.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(encoded) = file_name.strip_suffix(EXTENSION) else {
                continue;
            };
            match urlencoding::decode(encoded) {
                Ok(key) => keys.push(key.into_owned()),
                Err(e) => warn!("Skipping undecodable storage file {}: {}", file_name, e),
            }
        }

        Ok(keys)
    }

    fn is_durable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("post:my-slug", "{\"a\":1}").unwrap();
        assert_eq!(
            storage.get("post:my-slug").unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(storage.keys().unwrap(), vec!["post:my-slug".to_string()]);

        storage.remove("post:my-slug").unwrap();
        storage.remove("post:my-slug").unwrap();
        assert_eq!(storage.get("post:my-slug").unwrap(), None);
    }

    #[test]
    fn test_keys_with_unusual_characters() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("search:a/b_1_10", "x").unwrap();
        storage.set("categories:all", "y").unwrap();

        let mut keys = storage.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["categories:all", "search:a/b_1_10"]);
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README"), "hi").unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_quota() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap().with_quota(20);

        storage.set("k", "0123456789").unwrap();
        storage.set("k", "0123456789abcdef").unwrap();
        let err = storage.set("j", "0123456789").unwrap_err();
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn test_is_durable() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap().with_name("local");
        assert!(storage.is_durable());
        assert_eq!(storage.name(), "local");
    }
}
