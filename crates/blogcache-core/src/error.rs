//! Error types for blogcache.
//!
//! The cache is an accelerator, so almost every error defined here is
//! recovered close to where it happens: the engine turns storage and fetch
//! failures into cache misses and logs them. The variants exist so that the
//! recovery code can tell the failure modes apart.
//!
//! # Example
//!
//! ```
//! use blogcache_core::{CacheError, Result};
//!
//! fn require_slug(slug: &str) -> Result<&str> {
//!     if slug.is_empty() {
//!         return Err(CacheError::invalid_key("post:", "slug cannot be empty"));
//!     }
//!     Ok(slug)
//! }
//!
//! assert!(require_slug("").is_err());
//! ```

use std::io;
use thiserror::Error;

/// Main error type for blogcache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A storage tier threw or is absent (disabled storage, private mode).
    #[error("storage '{storage}' unavailable: {reason}")]
    StorageUnavailable {
        /// Name of the storage adapter
        storage: String,
        /// What went wrong
        reason: String,
    },

    /// A write did not fit in the storage quota.
    #[error("storage '{storage}' quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        /// Name of the storage adapter
        storage: String,
        /// Bytes the store would hold after the write
        needed: usize,
        /// Configured quota in bytes
        limit: usize,
    },

    /// A stored value could not be decoded.
    #[error("corrupt entry '{key}': {reason}")]
    CorruptEntry {
        /// Raw storage key
        key: String,
        /// Decode failure
        reason: String,
    },

    /// A content fetcher failed while populating a key.
    #[error("failed to fetch '{key}': {reason}")]
    FetchFailure {
        /// Key that was being populated
        key: String,
        /// Failure reported by the content layer
        reason: String,
    },

    /// A raw key does not follow the canonical encoding.
    #[error("invalid cache key '{key}': {reason}")]
    InvalidKey {
        /// The offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// A settings value is out of range.
    #[error("invalid configuration for '{field}': {message}")]
    InvalidConfig {
        /// Settings field path
        field: String,
        /// Description of the problem
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CacheError {
    /// Creates a StorageUnavailable error.
    pub fn unavailable(storage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            storage: storage.into(),
            reason: reason.into(),
        }
    }

    /// Creates a CorruptEntry error.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a FetchFailure error.
    pub fn fetch_failure(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailure {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an InvalidConfig error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if the storage behind a tier can no longer be used.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Returns true if the failure came from a storage tier rather than from
    /// the caller or the content layer.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::QuotaExceeded { .. }
                | Self::CorruptEntry { .. }
                | Self::Io(_)
        )
    }

    /// Returns true if this is a fetch failure from the content layer.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailure { .. })
    }
}

/// Type alias for Results with CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;
