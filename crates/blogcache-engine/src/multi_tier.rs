//! Read-through promotion and fan-out writes across tiers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use blogcache_core::{
    CacheEntry, CacheError, CacheKey, CacheSettings, Clock, ContentType, METRICS_KEY, Priority, Tier,
};
use blogcache_storage::StorageAdapter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::tier::TierCache;

/// Options for a multi-tier read.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Read order. Defaults to [`Tier::DEFAULT_READ_ORDER`].
    pub tiers: Option<Vec<Tier>>,
}

impl GetOptions {
    pub fn tiers(tiers: impl Into<Vec<Tier>>) -> Self {
        Self {
            tiers: Some(tiers.into()),
        }
    }
}

/// Options for a fan-out write.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL applied to every tier without a `tier_ttl` override.
    pub ttl_ms: Option<u64>,
    /// Tiers written. Defaults to [`Tier::DEFAULT_WRITE_SET`].
    pub tiers: Option<Vec<Tier>>,
    pub priority: Priority,
    /// Per-tier TTL overrides.
    pub tier_ttl: HashMap<Tier, u64>,
}

impl SetOptions {
    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_tiers(mut self, tiers: impl Into<Vec<Tier>>) -> Self {
        self.tiers = Some(tiers.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tier_ttl(mut self, tier: Tier, ttl_ms: u64) -> Self {
        self.tier_ttl.insert(tier, ttl_ms);
        self
    }

    /// TTL for one tier: override, then shared TTL, then the tier default.
    fn ttl_for(&self, tier: &TierCache) -> u64 {
        self.tier_ttl
            .get(&tier.tier())
            .copied()
            .or(self.ttl_ms)
            .unwrap_or_else(|| tier.default_ttl_ms())
    }
}

/// The three tiers behind one interface.
#[derive(Debug)]
pub struct MultiTierCache {
    tiers: [TierCache; 3],
    metrics: Arc<CacheMetrics>,
    clock: Arc<dyn Clock>,
}

impl MultiTierCache {
    /// Builds the tiers over the given adapters, indexed like [`Tier::ALL`].
    pub fn new(
        settings: &CacheSettings,
        storages: [Arc<dyn StorageAdapter>; 3],
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        let [memory, session, durable] = storages;
        let build = |tier: Tier, storage: Arc<dyn StorageAdapter>| {
            TierCache::new(
                tier,
                storage,
                *settings.tier(tier),
                Arc::clone(&clock),
                Arc::clone(&metrics),
            )
        };

        let tiers = [
            build(Tier::Memory, memory),
            build(Tier::Session, session),
            build(Tier::Durable, durable),
        ];

        Self {
            tiers,
            metrics,
            clock,
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierCache {
        &self.tiers[tier.index()]
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Reads through the default read order.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.get_with(key, &GetOptions::default())
    }

    /// Reads tiers in order; a hit in a later tier is copied into every
    /// tier read before it.
    pub fn get_with(&self, key: &CacheKey, options: &GetOptions) -> Option<Value> {
        let order = options
            .tiers
            .as_deref()
            .unwrap_or(&Tier::DEFAULT_READ_ORDER);

        self.metrics.time_operation("get", || {
            self.metrics.record_lookup();

            for (position, tier) in order.iter().enumerate() {
                let Some(entry) = self.tier(*tier).get_entry(key.as_str()) else {
                    self.metrics.record_miss(*tier);
                    continue;
                };

                self.metrics.record_hit(*tier);
                debug!(key = %key, tier = %tier, "Cache hit");
                self.promote(key.as_str(), &entry, &order[..position]);
                return Some(entry.payload);
            }

            self.metrics.record_full_miss();
            debug!(key = %key, "Cache miss in every tier");
            None
        })
    }

    fn promote(&self, key: &str, entry: &CacheEntry, faster: &[Tier]) {
        for tier in faster {
            let target = self.tier(*tier);
            let mut copy = CacheEntry::new(
                entry.payload.clone(),
                self.clock.now_ms(),
                target.default_ttl_ms(),
                entry.priority,
            )
            .with_tags(entry.tags.clone());
            copy.stale = entry.stale;

            match target.insert(key, copy) {
                Ok(()) => {
                    self.metrics.record_promotion(*tier);
                    debug!(key = %key, tier = %tier, "Entry promoted");
                },
                Err(e) => debug!(key = %key, tier = %tier, error = %e, "Promotion skipped"),
            }
        }
    }

    /// Writes to every requested tier. Returns how many accepted the write.
    pub fn set(&self, key: &CacheKey, payload: Value, options: &SetOptions) -> usize {
        let targets = options
            .tiers
            .as_deref()
            .unwrap_or(&Tier::DEFAULT_WRITE_SET);

        self.metrics.time_operation("set", || {
            self.metrics.record_set();
            let mut written = 0;

            for tier in targets {
                let cache = self.tier(*tier);
                let ttl_ms = options.ttl_for(cache);
                match cache.set(key, payload.clone(), ttl_ms, options.priority) {
                    Ok(()) => written += 1,
                    Err(e) => warn!(key = %key, tier = %tier, error = %e, "Tier write skipped"),
                }
            }

            written
        })
    }

    /// Removes a key from every tier. Returns how many tiers accepted.
    pub fn remove(&self, key: &str) -> usize {
        self.tiers
            .iter()
            .filter(|tier| tier.remove(key).is_ok())
            .count()
    }

    /// True if any tier holds a valid entry.
    pub fn contains(&self, key: &str) -> bool {
        self.tiers.iter().any(|tier| tier.has(key))
    }

    /// Union of one content type's keys over all tiers, sorted.
    pub fn keys_for(&self, content_type: ContentType) -> Vec<String> {
        let keys: BTreeSet<String> = self
            .tiers
            .iter()
            .flat_map(|tier| tier.keys_for(content_type))
            .collect();
        keys.into_iter().collect()
    }

    /// Union of every cache-owned key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let keys: BTreeSet<String> = self.tiers.iter().flat_map(|tier| tier.keys()).collect();
        keys.into_iter().collect()
    }

    /// The valid copy with the earliest `created_at`, without touching
    /// access stats. Promotion restamps copies, so this is the true age.
    pub fn oldest_entry(&self, key: &str) -> Option<CacheEntry> {
        self.tiers
            .iter()
            .filter_map(|tier| tier.peek(key))
            .min_by_key(|entry| entry.created_at)
    }

    /// Flags every valid copy as stale. Returns how many were flagged.
    pub fn mark_stale(&self, key: &str) -> usize {
        self.tiers
            .iter()
            .filter(|tier| tier.mark_stale(key))
            .count()
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.tiers
            .iter()
            .filter_map(|tier| tier.peek(key))
            .any(|entry| entry.stale)
    }

    pub fn cleanup_expired(&self) -> usize {
        self.tiers.iter().map(TierCache::cleanup_expired).sum()
    }

    pub fn clear_owned(&self) -> usize {
        self.tiers.iter().map(TierCache::clear_owned).sum()
    }

    /// Adds the lifetime counters persisted in the durable tier.
    pub fn load_metrics(&self) {
        let Some(raw) = self.tier(Tier::Durable).read_raw(METRICS_KEY) else {
            return;
        };
        match serde_json::from_str::<MetricsSnapshot>(&raw) {
            Ok(snapshot) => {
                self.metrics.restore(&snapshot);
                debug!(lookups = snapshot.lookups, "Restored persisted metrics");
            },
            Err(e) => warn!(error = %e, "Ignoring unreadable persisted metrics"),
        }
    }

    /// Persists the lifetime counters into the durable tier.
    pub fn flush_metrics(&self) {
        let snapshot = self.metrics.snapshot(self.clock.now_ms());
        let result = serde_json::to_string(&snapshot)
            .map_err(CacheError::from)
            .and_then(|raw| self.tier(Tier::Durable).write_raw(METRICS_KEY, &raw));

        match result {
            Ok(()) => debug!("Metrics flushed"),
            Err(e) => warn!(error = %e, "Failed to flush metrics"),
        }
        for tier in &self.tiers {
            self.metrics.update_entry_count(tier.tier(), tier.len());
        }
    }
}
