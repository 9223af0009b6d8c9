use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::adapter::StorageAdapter;
use crate::error::StorageError;

/// In-process storage.
///
/// Size accounting counts key plus value bytes, which is how browser
/// storage quotas behave closely enough for the cache's purposes.
#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    available: AtomicBool,
}

impl MemoryStorage {
    /// Creates an unbounded store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            quota_bytes: None,
            available: AtomicBool::new(true),
        }
    }

    /// Creates a store that rejects writes past `quota_bytes`.
    pub fn with_quota(name: impl Into<String>, quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new(name)
        }
    }

    /// Makes every operation fail with [`StorageError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Bytes currently held.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(&self.name, "storage is disabled"))
        }
    }
}

impl StorageAdapter for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut entries = self.entries.write();

        if let Some(limit) = self.quota_bytes {
            let current: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = current + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    storage: self.name.clone(),
                    needed,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.read().keys().cloned().collect())
    }
}
