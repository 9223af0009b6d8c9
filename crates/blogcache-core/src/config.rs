//! Cache settings.
//!
//! All durations are milliseconds. Every struct deserializes with defaults
//! so a partial settings file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::key::ContentType;
use crate::tier::Tier;

const SECOND: u64 = 1_000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// Capacity and default lifetime of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    pub max_entries: usize,
    pub default_ttl_ms: u64,
}

impl TierSettings {
    pub const fn new(max_entries: usize, default_ttl_ms: u64) -> Self {
        Self {
            max_entries,
            default_ttl_ms,
        }
    }
}

/// Hard and soft staleness thresholds for one content type.
///
/// Entries older than `hard_ttl_ms` are invalidated immediately; entries
/// older than `soft_ttl_ms` are refreshed in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPolicy {
    pub hard_ttl_ms: u64,
    pub soft_ttl_ms: u64,
}

impl ContentPolicy {
    pub const fn new(hard_ttl_ms: u64, soft_ttl_ms: u64) -> Self {
        Self {
            hard_ttl_ms,
            soft_ttl_ms,
        }
    }
}

/// Per content type policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPolicies {
    pub posts: ContentPolicy,
    pub post: ContentPolicy,
    pub categories: ContentPolicy,
    pub search: ContentPolicy,
}

impl ContentPolicies {
    pub fn for_type(&self, content_type: ContentType) -> ContentPolicy {
        match content_type {
            ContentType::Posts => self.posts,
            ContentType::Post => self.post,
            ContentType::Categories => self.categories,
            ContentType::Search => self.search,
        }
    }
}

impl Default for ContentPolicies {
    fn default() -> Self {
        Self {
            posts: ContentPolicy::new(5 * MINUTE, 2 * MINUTE),
            post: ContentPolicy::new(HOUR, 30 * MINUTE),
            categories: ContentPolicy::new(30 * MINUTE, 10 * MINUTE),
            search: ContentPolicy::new(2 * MINUTE, MINUTE),
        }
    }
}

/// Invalidation batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationSettings {
    /// Keys removed per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay_ms: u64,
    /// Delay before background refreshes start.
    pub background_delay_ms: u64,
    /// How often queued invalidation requests are drained.
    pub queue_interval_ms: u64,
    /// Queued requests handled per drain.
    pub queue_batch_size: usize,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay_ms: SECOND,
            background_delay_ms: 100,
            queue_interval_ms: 2 * SECOND,
            queue_batch_size: 20,
        }
    }
}

/// Warmup and popular-content refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupSettings {
    pub refresh_interval_ms: u64,
    /// Popular slugs refreshed per tick.
    pub popular_refresh_limit: usize,
    /// Popular slugs fetched by a single warm.
    pub popular_warm_limit: usize,
    /// Page size used when warming the first list page.
    pub recent_page_limit: u32,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 10 * MINUTE,
            popular_refresh_limit: 10,
            popular_warm_limit: 5,
            recent_page_limit: 10,
        }
    }
}

/// Periodic cleanup sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub interval_ms: u64,
    /// Entries older than this are removed by `cleanup_cache`.
    pub max_age_ms: u64,
    /// Keep entries read within `max_age_ms` even if they are old.
    pub keep_active: bool,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10 * MINUTE,
            max_age_ms: 24 * HOUR,
            keep_active: true,
        }
    }
}

/// Periodic performance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_ms: u64,
    /// Essential content is re-warmed below this hit rate.
    pub min_hit_rate_percent: u32,
    /// Expired entries are swept above this memory-tier usage.
    pub max_memory_usage_percent: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5 * MINUTE,
            min_hit_rate_percent: 60,
            max_memory_usage_percent: 90,
        }
    }
}

/// Root settings for a cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub memory: TierSettings,
    pub session: TierSettings,
    pub durable: TierSettings,
    pub policies: ContentPolicies,
    pub invalidation: InvalidationSettings,
    pub warmup: WarmupSettings,
    pub cleanup: CleanupSettings,
    pub monitor: MonitorSettings,
    pub metrics_flush_interval_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory: TierSettings::new(50, 5 * MINUTE),
            session: TierSettings::new(100, 30 * MINUTE),
            durable: TierSettings::new(100, HOUR),
            policies: ContentPolicies::default(),
            invalidation: InvalidationSettings::default(),
            warmup: WarmupSettings::default(),
            cleanup: CleanupSettings::default(),
            monitor: MonitorSettings::default(),
            metrics_flush_interval_ms: MINUTE,
        }
    }
}

impl CacheSettings {
    /// Settings for one tier.
    pub fn tier(&self, tier: Tier) -> &TierSettings {
        match tier {
            Tier::Memory => &self.memory,
            Tier::Session => &self.session,
            Tier::Durable => &self.durable,
        }
    }

    /// Checks ranges that would make the cache misbehave.
    pub fn validate(&self) -> Result<()> {
        for tier in Tier::ALL {
            let settings = self.tier(tier);
            if settings.max_entries == 0 {
                return Err(CacheError::invalid_config(
                    format!("{tier}.max_entries"),
                    "must be greater than zero",
                ));
            }
            if settings.default_ttl_ms == 0 {
                return Err(CacheError::invalid_config(
                    format!("{tier}.default_ttl_ms"),
                    "must be greater than zero",
                ));
            }
        }

        for content_type in ContentType::ALL {
            let policy = self.policies.for_type(content_type);
            if policy.soft_ttl_ms > policy.hard_ttl_ms {
                return Err(CacheError::invalid_config(
                    format!("policies.{content_type}"),
                    format!(
                        "soft_ttl_ms ({}) exceeds hard_ttl_ms ({})",
                        policy.soft_ttl_ms, policy.hard_ttl_ms
                    ),
                ));
            }
        }

        if self.invalidation.batch_size == 0 {
            return Err(CacheError::invalid_config(
                "invalidation.batch_size",
                "must be greater than zero",
            ));
        }
        if self.invalidation.queue_batch_size == 0 {
            return Err(CacheError::invalid_config(
                "invalidation.queue_batch_size",
                "must be greater than zero",
            ));
        }

        for (key, value) in [
            ("monitor.min_hit_rate_percent", self.monitor.min_hit_rate_percent),
            ("monitor.max_memory_usage_percent", self.monitor.max_memory_usage_percent),
        ] {
            if value > 100 {
                return Err(CacheError::invalid_config(key, "must be a percentage (0-100)"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CacheSettings::default();

        assert_eq!(settings.memory, TierSettings::new(50, 300_000));
        assert_eq!(settings.durable, TierSettings::new(100, 3_600_000));
        assert_eq!(settings.session.default_ttl_ms, 1_800_000);
        assert_eq!(settings.invalidation.batch_size, 50);
        assert_eq!(settings.invalidation.batch_delay_ms, 1_000);
        assert_eq!(settings.warmup.popular_warm_limit, 5);
        assert_eq!(settings.cleanup.max_age_ms, 86_400_000);
        assert_eq!(settings.invalidation.queue_batch_size, 20);
        assert_eq!(settings.monitor.min_hit_rate_percent, 60);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_policy_lookup() {
        let policies = ContentPolicies::default();
        assert_eq!(
            policies.for_type(ContentType::Post),
            ContentPolicy::new(3_600_000, 1_800_000)
        );
        assert_eq!(policies.for_type(ContentType::Search).hard_ttl_ms, 120_000);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let settings: CacheSettings = serde_json::from_str(
            r#"{"memory": {"max_entries": 10, "default_ttl_ms": 1000},
                "invalidation": {"batch_size": 5}}"#,
        )
        .unwrap();

        assert_eq!(settings.memory.max_entries, 10);
        assert_eq!(settings.invalidation.batch_size, 5);
        assert_eq!(settings.invalidation.batch_delay_ms, 1_000);
        assert_eq!(settings.durable.max_entries, 100);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut settings = CacheSettings::default();
        settings.session.max_entries = 0;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("session.max_entries"));
    }

    #[test]
    fn test_validate_rejects_soft_above_hard() {
        let mut settings = CacheSettings::default();
        settings.policies.search = ContentPolicy::new(1_000, 2_000);

        assert!(matches!(
            settings.validate(),
            Err(CacheError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_thresholds() {
        let mut settings = CacheSettings::default();
        settings.monitor.max_memory_usage_percent = 150;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.max_memory_usage_percent"));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut settings = CacheSettings::default();
        settings.invalidation.batch_size = 0;
        assert!(settings.validate().is_err());
    }
}
