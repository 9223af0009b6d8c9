//! The facade external collaborators use.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use blogcache_core::{
    CacheKey, CacheSettings, CleanupSettings, Clock, ContentType, Priority, Result, SystemClock,
    Tier,
};
use blogcache_storage::{MemoryStorage, StorageAdapter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::events::{CacheEvent, EventBus, PerformanceReport};
use crate::invalidation::{
    InvalidateOneOptions, InvalidateOptions, InvalidationCoordinator, InvalidationReport,
};
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::monitor::PerformanceMonitor;
use crate::multi_tier::{GetOptions, MultiTierCache, SetOptions};
use crate::source::ContentSource;
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::task::{TaskSet, spawn_deferred, spawn_periodic};
use crate::warmup::{WarmReport, WarmStrategy, WarmupScheduler};

/// Options for [`CacheManager::cleanup_cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanupOptions {
    pub max_age_ms: u64,
    /// Keep old entries that still have a subscriber.
    pub keep_active: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        CleanupSettings::default().into()
    }
}

impl From<CleanupSettings> for CleanupOptions {
    fn from(settings: CleanupSettings) -> Self {
        Self {
            max_age_ms: settings.max_age_ms,
            keep_active: settings.keep_active,
        }
    }
}

/// Per-tier section of [`StatsSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub tier: Tier,
    pub storage: String,
    pub available: bool,
    pub entries: usize,
    pub capacity: usize,
    pub usage_percent: f64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
}

/// Observability snapshot. Never used for cache decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub tiers: Vec<TierStats>,
    pub lookups: u64,
    /// Lookups served by some tier.
    pub hits: u64,
    /// Lookups that missed every tier.
    pub misses: u64,
    pub hit_rate: f64,
    pub promotions: u64,
    pub popular_posts: usize,
    pub pending_tasks: usize,
    pub active_subscriptions: usize,
    /// Invalidation requests waiting for the next drain.
    pub queued_invalidations: usize,
    pub event_listeners: usize,
}

/// One memory-tier entry in a [`CacheExport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEntry {
    pub key: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub priority: Priority,
    pub stale: bool,
    pub access_count: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Debug dump of the cache state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheExport {
    pub stats: StatsSnapshot,
    pub memory_entries: Vec<ExportedEntry>,
    pub settings: CacheSettings,
    pub metrics: MetricsSnapshot,
}

/// Builder for [`CacheManager`].
#[derive(Default)]
pub struct CacheManagerBuilder {
    settings: CacheSettings,
    clock: Option<Arc<dyn Clock>>,
    storages: [Option<Arc<dyn StorageAdapter>>; 3],
    source: Option<Arc<dyn ContentSource>>,
}

impl CacheManagerBuilder {
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Storage adapter for one tier. Tiers without one get a `MemoryStorage`.
    pub fn storage(mut self, tier: Tier, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storages[tier.index()] = Some(storage);
        self
    }

    pub fn source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Validates the settings and assembles the manager.
    ///
    /// Lifetime metrics persisted in the durable tier are loaded here.
    pub fn build(self) -> Result<CacheManager> {
        self.settings.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let [memory, session, durable] = self.storages;
        let storages = [
            storage_or_memory(memory, Tier::Memory),
            storage_or_memory(session, Tier::Session),
            storage_or_memory(durable, Tier::Durable),
        ];

        let metrics = Arc::new(CacheMetrics::new());
        let cache = Arc::new(MultiTierCache::new(
            &self.settings,
            storages,
            Arc::clone(&clock),
            metrics,
        ));
        cache.load_metrics();

        let events = EventBus::new();
        let invalidation = Arc::new(
            InvalidationCoordinator::new(
                Arc::clone(&cache),
                self.settings.policies,
                self.settings.invalidation,
                self.source.clone(),
            )
            .with_events(events.clone()),
        );
        let warmup = Arc::new(WarmupScheduler::new(
            Arc::clone(&cache),
            self.source.clone(),
            self.settings.policies,
            self.settings.warmup,
        ));
        let monitor = Arc::new(PerformanceMonitor::new(
            Arc::clone(&cache),
            Arc::clone(&warmup),
            events.clone(),
            self.settings.monitor,
        ));

        info!(
            source = self.source.as_ref().map(|s| s.name()).unwrap_or("none"),
            durable = %cache.tier(Tier::Durable).storage().name(),
            "Cache manager ready"
        );

        Ok(CacheManager {
            settings: self.settings,
            cache,
            invalidation,
            warmup,
            monitor,
            events,
            subscriptions: SubscriptionRegistry::new(),
            tasks: TaskSet::new(),
            source: self.source,
        })
    }
}

/// Single entry point for reads, writes, invalidation, warmup and stats.
///
/// Built once by the composition root and shared by reference.
pub struct CacheManager {
    settings: CacheSettings,
    cache: Arc<MultiTierCache>,
    invalidation: Arc<InvalidationCoordinator>,
    warmup: Arc<WarmupScheduler>,
    monitor: Arc<PerformanceMonitor>,
    events: EventBus,
    subscriptions: SubscriptionRegistry,
    tasks: TaskSet,
    source: Option<Arc<dyn ContentSource>>,
}

impl CacheManager {
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::default()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The underlying tiers.
    pub fn cache(&self) -> &Arc<MultiTierCache> {
        &self.cache
    }

    pub fn source(&self) -> Option<&Arc<dyn ContentSource>> {
        self.source.as_ref()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.cache.get(key)
    }

    pub fn get_with(&self, key: &CacheKey, options: &GetOptions) -> Option<Value> {
        self.cache.get_with(key, options)
    }

    /// Fan-out write. Returns the number of tiers written.
    pub fn set(&self, key: &CacheKey, payload: Value, options: &SetOptions) -> usize {
        self.cache.set(key, payload, options)
    }

    pub async fn invalidate_by_type(
        &self,
        content_type: ContentType,
        options: &InvalidateOptions,
    ) -> InvalidationReport {
        self.invalidation.invalidate(content_type, options).await
    }

    pub async fn invalidate_one(
        &self,
        key: &str,
        options: InvalidateOneOptions,
    ) -> InvalidationReport {
        self.invalidation.invalidate_one(key, options).await
    }

    pub async fn invalidate_all(&self, options: &InvalidateOptions) -> InvalidationReport {
        self.invalidation.invalidate_all(options).await
    }

    pub async fn invalidate_matching(&self, pattern: &str) -> InvalidationReport {
        self.invalidation.invalidate_matching(pattern).await
    }

    /// Removes the given keys now.
    pub async fn invalidate_keys(
        &self,
        keys: &[String],
        options: InvalidateOneOptions,
    ) -> InvalidationReport {
        self.invalidation.invalidate_keys(keys, options).await
    }

    /// Queues keys for the periodic drain. Returns the queue length.
    pub fn queue_invalidation(&self, keys: Vec<String>, options: InvalidateOneOptions) -> usize {
        self.invalidation.enqueue(keys, options)
    }

    /// Drains one batch of queued invalidations now.
    pub async fn process_invalidation_queue(&self) -> usize {
        self.invalidation.process_queue().await
    }

    /// Receiver for invalidation and performance events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Runs one performance check now.
    pub async fn monitor_performance(&self) -> PerformanceReport {
        self.monitor.check().await
    }

    /// Marks slugs (or `post:` keys) popular and schedules a warm pass for
    /// the ones not marked before. Returns those slugs.
    pub fn mark_as_popular<I, S>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.warmup.mark_popular(items);
        if added.is_empty() {
            return added;
        }

        let keys: Vec<CacheKey> = added
            .iter()
            .take(self.settings.warmup.popular_refresh_limit)
            .map(CacheKey::post)
            .collect();
        let warmup = Arc::clone(&self.warmup);
        self.tasks.push(spawn_deferred("popular-warm", Duration::ZERO, move || async move {
            let report = warmup.warm_keys(keys, false).await;
            debug!(warmed = report.warmed, failed = report.failed.len(), "Popular warm pass done");
        }));

        debug!(count = added.len(), "Posts marked as popular");
        added
    }

    pub fn popular(&self) -> Vec<String> {
        self.warmup.popular()
    }

    pub async fn warm_cache(&self, strategy: &WarmStrategy) -> WarmReport {
        self.warmup.warm(strategy).await
    }

    /// Registers active use of a key; see [`CacheManager::cleanup_cache`].
    #[must_use = "the subscription ends when the guard is dropped"]
    pub fn subscribe(&self, key: &CacheKey) -> Subscription {
        self.subscriptions.subscribe(key.as_str())
    }

    /// Removes expired entries from every tier.
    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Removes expired entries, then entries older than `max_age_ms`
    /// without a subscriber (any age-qualified entry when `keep_active` is
    /// off). Returns how many keys went.
    pub fn cleanup_cache(&self, options: CleanupOptions) -> usize {
        let now = self.cache.clock().now_ms();
        let before: BTreeSet<String> = self.cache.keys().into_iter().collect();
        self.cache.cleanup_expired();

        for key in self.cache.keys() {
            let Some(entry) = self.cache.oldest_entry(&key) else {
                continue;
            };
            let too_old = entry.age_ms(now) > options.max_age_ms;
            let in_use = options.keep_active && self.subscriptions.is_active(&key);
            if too_old && !in_use {
                self.cache.remove(&key);
            }
        }

        // a key held by several tiers counts once
        let after: BTreeSet<String> = self.cache.keys().into_iter().collect();
        let removed = before.difference(&after).count();
        info!(removed, "Cache cleanup completed");
        removed
    }

    pub fn stats(&self) -> StatsSnapshot {
        let metrics = self.cache.metrics();
        let tiers = Tier::ALL
            .into_iter()
            .map(|tier| {
                let cache = self.cache.tier(tier);
                let entries = cache.len();
                let capacity = cache.capacity();
                TierStats {
                    tier,
                    storage: cache.storage().name().to_string(),
                    available: cache.is_available(),
                    entries,
                    capacity,
                    usage_percent: percent(entries, capacity),
                    hits: metrics.hits(tier),
                    misses: metrics.misses(tier),
                    hit_rate: metrics.tier_hit_rate(tier),
                    evictions: metrics.evictions(tier),
                }
            })
            .collect();

        let lookups = metrics.lookups();
        let misses = metrics.full_misses();
        StatsSnapshot {
            tiers,
            lookups,
            hits: lookups.saturating_sub(misses),
            misses,
            hit_rate: metrics.hit_rate(),
            promotions: metrics.promotions(),
            popular_posts: self.warmup.popular_count(),
            pending_tasks: self.tasks.pending() + self.invalidation.pending_tasks(),
            active_subscriptions: self.subscriptions.active_keys(),
            queued_invalidations: self.invalidation.queued(),
            event_listeners: self.events.receiver_count(),
        }
    }

    /// Stats, memory-tier entries, settings and lifetime counters.
    pub fn export(&self) -> CacheExport {
        let memory = self.cache.tier(Tier::Memory);
        let memory_entries = memory
            .keys()
            .into_iter()
            .filter_map(|key| {
                let entry = memory.peek(&key)?;
                Some(ExportedEntry {
                    created_at: entry.created_at,
                    expires_at: entry.expires_at(),
                    priority: entry.priority,
                    stale: entry.stale,
                    access_count: entry.access_count,
                    tags: entry.tags,
                    key,
                })
            })
            .collect();

        CacheExport {
            stats: self.stats(),
            memory_entries,
            settings: self.settings.clone(),
            metrics: self.cache.metrics().snapshot(self.cache.clock().now_ms()),
        }
    }

    /// Starts the expired-entry sweep, invalidation queue drain,
    /// performance check, popular refresh and metrics flush.
    pub fn start_background_tasks(&self) {
        let cache = Arc::clone(&self.cache);
        self.tasks.push(spawn_periodic(
            "cleanup",
            Duration::from_millis(self.settings.cleanup.interval_ms),
            move || {
                let cache = Arc::clone(&cache);
                async move {
                    let removed = cache.cleanup_expired();
                    debug!(removed, "Periodic cleanup");
                }
            },
        ));

        let invalidation = Arc::clone(&self.invalidation);
        self.tasks.push(spawn_periodic(
            "invalidation-queue",
            Duration::from_millis(self.settings.invalidation.queue_interval_ms),
            move || {
                let invalidation = Arc::clone(&invalidation);
                async move {
                    invalidation.process_queue().await;
                }
            },
        ));

        let monitor = Arc::clone(&self.monitor);
        self.tasks.push(spawn_periodic(
            "performance-monitor",
            Duration::from_millis(self.settings.monitor.interval_ms),
            move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    monitor.check().await;
                }
            },
        ));

        let cache = Arc::clone(&self.cache);
        self.tasks.push(spawn_periodic(
            "metrics-flush",
            Duration::from_millis(self.settings.metrics_flush_interval_ms),
            move || {
                let cache = Arc::clone(&cache);
                async move { cache.flush_metrics() }
            },
        ));

        self.warmup
            .start(Duration::from_millis(self.settings.warmup.refresh_interval_ms));

        info!("Cache background tasks started");
    }

    /// Cancels every pending task and flushes metrics. Pending warmups are
    /// dropped, not awaited.
    pub fn shutdown(&self) {
        self.warmup.stop();
        let cancelled = self.tasks.cancel_all() + self.invalidation.cancel_pending();
        self.cache.flush_metrics();
        info!(cancelled, "Cache manager shut down");
    }

    /// Waits for deferred work such as popular warm passes and background
    /// refetches.
    pub async fn wait_pending(&self) {
        self.tasks.wait_all().await;
        self.invalidation.wait_pending().await;
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.warmup.stop();
        self.tasks.cancel_all();
        self.invalidation.cancel_pending();
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .field("warmup", &self.warmup)
            .finish_non_exhaustive()
    }
}

fn storage_or_memory(storage: Option<Arc<dyn StorageAdapter>>, tier: Tier) -> Arc<dyn StorageAdapter> {
    match storage {
        Some(storage) => storage,
        None => Arc::new(MemoryStorage::new(tier.as_str())),
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
