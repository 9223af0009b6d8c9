//! Periodic performance check.
//!
//! A low overall hit rate re-warms the essential content (categories and
//! the first list page); a nearly full memory tier triggers an expired
//! sweep. Every check is published as a [`CacheEvent::Performance`].

use std::sync::Arc;

use blogcache_core::{MonitorSettings, Tier};
use tracing::{debug, warn};

use crate::events::{CacheEvent, EventBus, PerformanceReport};
use crate::multi_tier::MultiTierCache;
use crate::warmup::{WarmStrategy, WarmupScheduler};

#[derive(Debug)]
pub struct PerformanceMonitor {
    cache: Arc<MultiTierCache>,
    warmup: Arc<WarmupScheduler>,
    events: EventBus,
    settings: MonitorSettings,
}

impl PerformanceMonitor {
    pub fn new(
        cache: Arc<MultiTierCache>,
        warmup: Arc<WarmupScheduler>,
        events: EventBus,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            cache,
            warmup,
            events,
            settings,
        }
    }

    /// Runs one check and acts on its thresholds.
    pub async fn check(&self) -> PerformanceReport {
        let metrics = self.cache.metrics();
        let memory = self.cache.tier(Tier::Memory);
        let capacity = memory.capacity().max(1);

        let mut report = PerformanceReport {
            lookups: metrics.lookups(),
            hit_rate: metrics.hit_rate(),
            memory_usage_percent: memory.len() as f64 * 100.0 / capacity as f64,
            ..Default::default()
        };

        let min_hit_rate = f64::from(self.settings.min_hit_rate_percent) / 100.0;
        if report.hit_rate < min_hit_rate {
            warn!(
                hit_rate = report.hit_rate,
                lookups = report.lookups,
                "Low cache hit rate, warming essential content"
            );
            let warm = self.warmup.warm(&WarmStrategy::essential()).await;
            report.rewarmed = true;
            report.warmed = warm.warmed;
        }

        if report.memory_usage_percent > f64::from(self.settings.max_memory_usage_percent) {
            warn!(
                usage_percent = report.memory_usage_percent,
                "High memory tier usage, sweeping expired entries"
            );
            report.expired_removed = self.cache.cleanup_expired();
        }

        debug!(
            hit_rate = report.hit_rate,
            memory_usage_percent = report.memory_usage_percent,
            "Performance check done"
        );
        self.events.publish(CacheEvent::Performance(report.clone()));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CacheMetrics;
    use crate::multi_tier::SetOptions;
    use crate::test_support::{MockSource, clock};
    use blogcache_core::{CacheKey, CacheSettings, ManualClock};
    use blogcache_storage::MemoryStorage;
    use serde_json::json;

    fn monitor(clock: Arc<ManualClock>, settings: CacheSettings) -> (PerformanceMonitor, EventBus) {
        let cache = Arc::new(MultiTierCache::new(
            &settings,
            [
                Arc::new(MemoryStorage::new("memory")),
                Arc::new(MemoryStorage::new("session")),
                Arc::new(MemoryStorage::new("durable")),
            ],
            clock,
            Arc::new(CacheMetrics::new()),
        ));
        let warmup = Arc::new(WarmupScheduler::new(
            Arc::clone(&cache),
            Some(Arc::new(MockSource::new())),
            settings.policies,
            settings.warmup,
        ));
        let events = EventBus::new();
        let monitor = PerformanceMonitor::new(cache, warmup, events.clone(), settings.monitor);
        (monitor, events)
    }

    #[tokio::test]
    async fn test_low_hit_rate_rewarms_essentials() {
        let (monitor, events) = monitor(clock(0), CacheSettings::default());
        let mut rx = events.subscribe();
        monitor.cache.get(&CacheKey::post("missing"));

        let report = monitor.check().await;

        assert!(report.rewarmed);
        assert_eq!(report.warmed, 2);
        assert!(monitor.cache.contains("categories:all"));
        assert!(monitor.cache.contains("posts:1_10_null_null"));
        assert!(matches!(rx.try_recv().unwrap(), CacheEvent::Performance(r) if r.rewarmed));
    }

    #[tokio::test]
    async fn test_healthy_cache_is_left_alone() {
        let (monitor, _events) = monitor(clock(0), CacheSettings::default());
        let key = CacheKey::post("a");
        monitor.cache.set(&key, json!(1), &SetOptions::default());
        monitor.cache.get(&key);

        let report = monitor.check().await;

        assert!((report.hit_rate - 1.0).abs() < f64::EPSILON);
        assert!(!report.rewarmed);
        assert_eq!(report.expired_removed, 0);
    }

    #[tokio::test]
    async fn test_full_memory_tier_sweeps_expired() {
        let clock = clock(0);
        let mut settings = CacheSettings::default();
        settings.memory.max_entries = 4;
        settings.monitor.min_hit_rate_percent = 0;
        let (monitor, _events) = monitor(clock.clone(), settings);

        let short = SetOptions::default().with_ttl(1_000).with_tiers([Tier::Memory]);
        for slug in ["a", "b", "c", "d"] {
            monitor.cache.set(&CacheKey::post(slug), json!(slug), &short);
        }
        clock.advance_ms(2_000);

        let report = monitor.check().await;

        assert!((report.memory_usage_percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.expired_removed, 4);
        assert!(monitor.cache.tier(Tier::Memory).is_empty());
    }
}
