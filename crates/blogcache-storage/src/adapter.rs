use std::fmt;

use crate::error::StorageError;

/// A synchronous string key/value store.
///
/// Implementations must be usable from several threads at once. Keys that
/// the cache did not write may be present; callers filter by prefix.
pub trait StorageAdapter: Send + Sync + fmt::Debug {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Reads a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every key in the store.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Lists keys starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    /// Whether values outlive the process.
    fn is_durable(&self) -> bool {
        false
    }
}
