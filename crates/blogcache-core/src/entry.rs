//! The unit stored in every tier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Eviction priority. `Normal` entries are evicted before `High` ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// A cached payload plus its metadata.
///
/// Validity depends only on `created_at` and `ttl_ms`. Access statistics are
/// process-local and are not part of the persisted envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: Value,
    pub created_at: u64,
    pub ttl_ms: u64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    #[serde(skip)]
    pub access_count: u64,
    #[serde(skip)]
    pub last_accessed_at: u64,
}

impl CacheEntry {
    /// Creates an entry written at `now_ms`.
    pub fn new(payload: Value, now_ms: u64, ttl_ms: u64, priority: Priority) -> Self {
        Self {
            payload,
            created_at: now_ms,
            ttl_ms,
            priority,
            tags: Vec::new(),
            stale: false,
            access_count: 0,
            last_accessed_at: now_ms,
        }
    }

    /// Attaches structured tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// True while `now - created_at < ttl_ms`.
    pub fn is_valid(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) < self.ttl_ms
    }

    /// Milliseconds since the entry was written.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at)
    }

    /// Epoch milliseconds at which the entry stops being valid.
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl_ms)
    }

    /// Records a read.
    pub fn touch(&mut self, now_ms: u64) {
        self.access_count += 1;
        self.last_accessed_at = now_ms;
    }

    /// Serializes the persisted envelope.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a persisted envelope. Access stats start at the write time.
    pub fn from_json(key: &str, raw: &str) -> Result<Self> {
        let mut entry: CacheEntry =
            serde_json::from_str(raw).map_err(|e| CacheError::corrupt(key, e.to_string()))?;
        entry.last_accessed_at = entry.created_at;
        Ok(entry)
    }
}
