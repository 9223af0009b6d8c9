//! Blogcache Core - Domain types shared by every tier
//!
//! This crate provides the foundational types for the blogcache system:
//! canonical cache keys, the entry envelope, tier identifiers, the clock
//! abstraction and the settings tree.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheSettings, CleanupSettings, ContentPolicies, ContentPolicy, InvalidationSettings,
    MonitorSettings, TierSettings, WarmupSettings,
};
pub use entry::{CacheEntry, Priority};
pub use error::{CacheError, Result};
pub use key::{CacheKey, ContentType, KeyKind, ListQuery};
pub use tier::Tier;

/// Storage key reserved for the persisted lifetime metrics.
pub const METRICS_KEY: &str = "blogcache:metrics";

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_defined() {
        assert!(!version().is_empty());
    }

    #[test]
    fn version_is_semver() {
        let v = version();
        assert_eq!(v.split('.').count(), 3, "Version should be semver");
    }

    #[test]
    fn metrics_key_is_outside_content_namespace() {
        assert!(!ContentType::owns(METRICS_KEY));
    }
}
