//! A single cache tier over one storage adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use blogcache_core::{
    CacheEntry, CacheError, CacheKey, Clock, ContentType, Priority, Result, Tier, TierSettings,
};
use blogcache_storage::{StorageAdapter, StorageError};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::CacheMetrics;

#[derive(Debug, Clone, Copy, Default)]
struct AccessStats {
    count: u64,
    last: u64,
}

/// Entry validity, lazy expiration and capacity eviction over one
/// [`StorageAdapter`].
///
/// Only keys under the content prefixes are ever listed, evicted or
/// cleared. Storage failures degrade to misses; an unavailable store
/// disables the tier until the process restarts.
#[derive(Debug)]
pub struct TierCache {
    tier: Tier,
    storage: Arc<dyn StorageAdapter>,
    settings: TierSettings,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    access: RwLock<HashMap<String, AccessStats>>,
    available: AtomicBool,
    write_lock: Mutex<()>,
}

impl TierCache {
    pub fn new(
        tier: Tier,
        storage: Arc<dyn StorageAdapter>,
        settings: TierSettings,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            tier,
            storage,
            settings,
            clock,
            metrics,
            access: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            write_lock: Mutex::new(()),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn capacity(&self) -> usize {
        self.settings.max_entries
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.settings.default_ttl_ms
    }

    /// False once the storage reported itself unavailable.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Returns the payload of a valid entry and records the access.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).map(|entry| entry.payload)
    }

    /// Returns the full valid entry and records the access.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let mut entry = self.read_valid(key)?;
        let mut access = self.access.write();
        let stats = access.entry(key.to_string()).or_default();
        entry.access_count = stats.count;
        entry.touch(self.clock.now_ms());
        *stats = AccessStats {
            count: entry.access_count,
            last: entry.last_accessed_at,
        };
        Some(entry)
    }

    /// Returns a valid entry without touching access stats.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.read_valid(key)
    }

    /// Validity-aware existence check.
    pub fn has(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Writes a new entry stamped with the current time.
    pub fn set(&self, key: &CacheKey, payload: Value, ttl_ms: u64, priority: Priority) -> Result<()> {
        let entry = CacheEntry::new(payload, self.clock.now_ms(), ttl_ms, priority)
            .with_tags(key.tags());
        self.insert(key.as_str(), entry)
    }

    /// Writes a prepared entry, evicting first if the tier is full.
    pub fn insert(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.ensure_available()?;
        let raw = entry.to_json()?;
        let _guard = self.write_lock.lock();

        let exists = self.raw_get(key)?.is_some();
        if !exists {
            self.make_room()?;
        }

        match self.storage.set(key, &raw) {
            Ok(()) => {},
            Err(StorageError::QuotaExceeded { .. }) => {
                debug!(tier = %self.tier, key = %key, "Quota exceeded, evicting and retrying");
                self.evict()?;
                self.storage
                    .set(key, &raw)
                    .map_err(|e| self.storage_failure("set", key, e))?;
            },
            Err(e) => return Err(self.storage_failure("set", key, e)),
        }

        self.access.write().insert(
            key.to_string(),
            AccessStats {
                count: 0,
                last: entry.created_at,
            },
        );
        Ok(())
    }

    /// Removes a key. Absent keys are not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.access.write().remove(key);
        self.storage
            .remove(key)
            .map_err(|e| self.storage_failure("remove", key, e))
    }

    /// Every cache-owned key in the tier.
    pub fn keys(&self) -> Vec<String> {
        self.list_keys(None)
    }

    /// Cache-owned keys of one content type.
    pub fn keys_for(&self, content_type: ContentType) -> Vec<String> {
        self.list_keys(Some(content_type))
    }

    /// Number of cache-owned keys, valid or not.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flags a valid entry as stale, keeping its timestamps and payload.
    ///
    /// The read happens under the write lock so a concurrent `set` is
    /// either flagged or wins, never reverted.
    pub fn mark_stale(&self, key: &str) -> bool {
        let _guard = self.write_lock.lock();
        let Some(mut entry) = self.read_valid(key) else {
            return false;
        };
        if entry.stale {
            return true;
        }
        entry.stale = true;

        let raw = match entry.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(tier = %self.tier, key = %key, error = %e, "Failed to encode stale entry");
                return false;
            },
        };
        match self.storage.set(key, &raw) {
            Ok(()) => true,
            Err(e) => {
                self.storage_failure("mark_stale", key, e);
                false
            },
        }
    }

    /// Removes every expired or undecodable entry. Returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        if !self.is_available() {
            return 0;
        }
        let _guard = self.write_lock.lock();
        let removed = self.sweep_expired();
        if removed > 0 {
            debug!(tier = %self.tier, removed, "Expired entries removed");
        }
        self.metrics.update_entry_count(self.tier, self.len());
        removed
    }

    /// Removes every cache-owned key and nothing else.
    pub fn clear_owned(&self) -> usize {
        let keys = self.keys();
        let mut removed = 0;
        for key in &keys {
            if self.remove(key).is_ok() {
                removed += 1;
            }
        }
        self.metrics.update_entry_count(self.tier, self.len());
        removed
    }

    /// Reads a key outside the content namespace, such as persisted metrics.
    pub fn read_raw(&self, key: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        self.raw_get(key).ok().flatten()
    }

    /// Writes a key outside the content namespace.
    pub fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        self.storage
            .set(key, value)
            .map_err(|e| self.storage_failure("write_raw", key, e))
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(CacheError::unavailable(
                self.storage.name(),
                "disabled for this session",
            ))
        }
    }

    fn raw_get(&self, key: &str) -> Result<Option<String>> {
        self.storage
            .get(key)
            .map_err(|e| self.storage_failure("get", key, e))
    }

    /// Loads and decodes an entry, deleting it if it is corrupt. Expiry is
    /// not checked.
    fn load(&self, key: &str) -> Option<CacheEntry> {
        if !self.is_available() {
            return None;
        }
        let raw = self.raw_get(key).ok()??;

        match CacheEntry::from_json(key, &raw) {
            Ok(mut entry) => {
                if let Some(stats) = self.access.read().get(key) {
                    entry.access_count = stats.count;
                    entry.last_accessed_at = stats.last;
                }
                Some(entry)
            },
            Err(e) => {
                warn!(tier = %self.tier, key = %key, error = %e, "Removing corrupt entry");
                let _ = self.remove(key);
                None
            },
        }
    }

    fn read_valid(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.load(key)?;
        if entry.is_valid(self.clock.now_ms()) {
            Some(entry)
        } else {
            debug!(tier = %self.tier, key = %key, "Expired entry removed on read");
            let _ = self.remove(key);
            None
        }
    }

    fn list_keys(&self, content_type: Option<ContentType>) -> Vec<String> {
        if !self.is_available() {
            return Vec::new();
        }
        let listed = match content_type {
            Some(ct) => self.storage.keys_with_prefix(&ct.key_prefix()),
            None => self.storage.keys(),
        };
        match listed {
            Ok(keys) => keys.into_iter().filter(|k| ContentType::owns(k)).collect(),
            Err(e) => {
                self.storage_failure("keys", "*", e);
                Vec::new()
            },
        }
    }

    /// Caller holds the write lock.
    fn make_room(&self) -> Result<()> {
        if self.keys().len() < self.settings.max_entries {
            return Ok(());
        }
        self.sweep_expired();
        if self.keys().len() < self.settings.max_entries {
            return Ok(());
        }
        self.evict()?;
        Ok(())
    }

    /// Caller holds the write lock.
    fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        for key in self.keys() {
            match self.load(&key) {
                Some(entry) if entry.is_valid(now) => {},
                // load already deleted corrupt entries
                None => removed += 1,
                Some(_) => {
                    if self.remove(&key).is_ok() {
                        removed += 1;
                    }
                },
            }
        }
        removed
    }

    /// Evicts the least valuable quarter of the eligible entries.
    ///
    /// `High` entries are only eligible once no `Normal` entry is left.
    /// Caller holds the write lock.
    fn evict(&self) -> Result<usize> {
        let mut candidates: Vec<(String, Priority, u64)> = self
            .keys()
            .into_iter()
            .filter_map(|key| {
                let entry = self.load(&key)?;
                Some((key, entry.priority, entry.last_accessed_at))
            })
            .collect();

        if candidates.iter().any(|(_, p, _)| *p == Priority::Normal) {
            candidates.retain(|(_, p, _)| *p == Priority::Normal);
        }
        if candidates.is_empty() {
            return Ok(0);
        }
        candidates.sort_by(|a, b| (a.1, a.2, &a.0).cmp(&(b.1, b.2, &b.0)));

        let count = candidates.len().div_ceil(4).max(1);
        let mut evicted = 0;
        for (key, _, _) in candidates.into_iter().take(count) {
            self.remove(&key)?;
            evicted += 1;
        }

        debug!(tier = %self.tier, evicted, "Capacity eviction");
        self.metrics.record_eviction(self.tier, evicted as u64);
        Ok(evicted)
    }

    fn storage_failure(&self, op: &str, key: &str, err: StorageError) -> CacheError {
        if err.is_unavailable() {
            if self.available.swap(false, Ordering::SeqCst) {
                warn!(
                    tier = %self.tier,
                    storage = %self.storage.name(),
                    error = %err,
                    "Storage unavailable, tier disabled for this session"
                );
            }
        } else {
            warn!(tier = %self.tier, op, key = %key, error = %err, "Storage operation failed");
        }
        err.into()
    }
}
