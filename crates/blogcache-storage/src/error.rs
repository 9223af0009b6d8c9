use blogcache_core::CacheError;
use thiserror::Error;

/// Errors raised by storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store cannot be used at all.
    #[error("storage '{storage}' unavailable: {reason}")]
    Unavailable { storage: String, reason: String },

    /// The write would exceed the store's byte quota.
    #[error("storage '{storage}' quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        storage: String,
        needed: usize,
        limit: usize,
    },

    /// Filesystem error.
    #[error("storage '{storage}' I/O error: {source}")]
    Io {
        storage: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn unavailable(storage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            storage: storage.into(),
            reason: reason.into(),
        }
    }

    pub fn io(storage: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            storage: storage.into(),
            source,
        }
    }

    /// True if retrying against this store is pointless for the session.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// True if the write was rejected for lack of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { storage, reason } => {
                CacheError::StorageUnavailable { storage, reason }
            },
            StorageError::QuotaExceeded {
                storage,
                needed,
                limit,
            } => CacheError::QuotaExceeded {
                storage,
                needed,
                limit,
            },
            StorageError::Io { source, .. } => CacheError::Io(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_variant() {
        let err: CacheError = StorageError::unavailable("session", "disabled").into();
        assert!(err.is_unavailable());

        let err: CacheError = StorageError::QuotaExceeded {
            storage: "durable".into(),
            needed: 10,
            limit: 5,
        }
        .into();
        assert!(matches!(err, CacheError::QuotaExceeded { needed: 10, .. }));
    }

    #[test]
    fn test_io_display() {
        let err = StorageError::io(
            "durable",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("durable"));
        assert!(err.to_string().contains("denied"));
        assert!(!err.is_unavailable());
    }
}
