//! Cache metrics recording.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use blogcache_core::Tier;
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};

/// Registers metric descriptions with the installed recorder.
/// Call once at startup.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "blogcache_cache_hits_total",
        "Total number of cache hits per tier"
    );
    metrics::describe_counter!(
        "blogcache_cache_misses_total",
        "Total number of cache misses per tier"
    );
    metrics::describe_counter!(
        "blogcache_cache_evictions_total",
        "Total number of capacity evictions per tier"
    );
    metrics::describe_counter!(
        "blogcache_cache_promotions_total",
        "Total number of entries copied into a faster tier"
    );
    metrics::describe_gauge!("blogcache_cache_entries", "Current number of entries per tier");
    metrics::describe_histogram!(
        "blogcache_cache_operation_seconds",
        "Time spent on cache operations"
    );
}

/// Counters of a single tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Persisted lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub tiers: BTreeMap<Tier, TierCounters>,
    #[serde(default)]
    pub lookups: u64,
    #[serde(default)]
    pub full_misses: u64,
    #[serde(default)]
    pub sets: u64,
    #[serde(default)]
    pub promotions: u64,
    #[serde(default)]
    pub saved_at: u64,
}

impl MetricsSnapshot {
    pub fn tier(&self, tier: Tier) -> TierCounters {
        self.tiers.get(&tier).copied().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct TierAtomics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Cache counters.
///
/// Atomic counters are the source of truth for stats and persistence;
/// every increment is mirrored to the `metrics` facade.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    tiers: [TierAtomics; 3],
    lookups: AtomicU64,
    full_misses: AtomicU64,
    sets: AtomicU64,
    promotions: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_atomics(&self, tier: Tier) -> &TierAtomics {
        &self.tiers[tier.index()]
    }

    pub fn record_hit(&self, tier: Tier) {
        self.tier_atomics(tier).hits.fetch_add(1, Ordering::Relaxed);
        counter!("blogcache_cache_hits_total", "tier" => tier.as_str()).increment(1);
    }

    pub fn record_miss(&self, tier: Tier) {
        self.tier_atomics(tier).misses.fetch_add(1, Ordering::Relaxed);
        counter!("blogcache_cache_misses_total", "tier" => tier.as_str()).increment(1);
    }

    pub fn record_eviction(&self, tier: Tier, count: u64) {
        self.tier_atomics(tier)
            .evictions
            .fetch_add(count, Ordering::Relaxed);
        counter!("blogcache_cache_evictions_total", "tier" => tier.as_str()).increment(count);
    }

    /// Records one multi-tier lookup.
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that missed every tier it read.
    pub fn record_full_miss(&self) {
        self.full_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self, into: Tier) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        counter!("blogcache_cache_promotions_total", "tier" => into.as_str()).increment(1);
    }

    /// Updates the entry gauge of a tier.
    pub fn update_entry_count(&self, tier: Tier, count: usize) {
        gauge!("blogcache_cache_entries", "tier" => tier.as_str()).set(count as f64);
    }

    pub fn record_operation_duration(&self, operation: &'static str, duration: Duration) {
        histogram!("blogcache_cache_operation_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Runs `f` and records how long it took.
    pub fn time_operation<T, F: FnOnce() -> T>(&self, operation: &'static str, f: F) -> T {
        let start = Instant::now();
        let result = f();
        self.record_operation_duration(operation, start.elapsed());
        result
    }

    pub fn hits(&self, tier: Tier) -> u64 {
        self.tier_atomics(tier).hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self, tier: Tier) -> u64 {
        self.tier_atomics(tier).misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self, tier: Tier) -> u64 {
        self.tier_atomics(tier).evictions.load(Ordering::Relaxed)
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn full_misses(&self) -> u64 {
        self.full_misses.load(Ordering::Relaxed)
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// Hit rate of one tier in `[0, 1]`.
    pub fn tier_hit_rate(&self, tier: Tier) -> f64 {
        ratio(self.hits(tier), self.misses(tier))
    }

    /// Share of lookups served by any tier, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        let full_misses = self.full_misses();
        ratio(lookups.saturating_sub(full_misses), full_misses)
    }

    /// Copies the counters into a persistable snapshot.
    pub fn snapshot(&self, now_ms: u64) -> MetricsSnapshot {
        let tiers = Tier::ALL
            .into_iter()
            .map(|tier| {
                (
                    tier,
                    TierCounters {
                        hits: self.hits(tier),
                        misses: self.misses(tier),
                        evictions: self.evictions(tier),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            tiers,
            lookups: self.lookups(),
            full_misses: self.full_misses(),
            sets: self.sets.load(Ordering::Relaxed),
            promotions: self.promotions(),
            saved_at: now_ms,
        }
    }

    /// Adds persisted lifetime counters to the live ones.
    pub fn restore(&self, snapshot: &MetricsSnapshot) {
        for tier in Tier::ALL {
            let counters = snapshot.tier(tier);
            let atomics = self.tier_atomics(tier);
            atomics.hits.fetch_add(counters.hits, Ordering::Relaxed);
            atomics.misses.fetch_add(counters.misses, Ordering::Relaxed);
            atomics
                .evictions
                .fetch_add(counters.evictions, Ordering::Relaxed);
        }
        self.lookups.fetch_add(snapshot.lookups, Ordering::Relaxed);
        self.full_misses
            .fetch_add(snapshot.full_misses, Ordering::Relaxed);
        self.sets.fetch_add(snapshot.sets, Ordering::Relaxed);
        self.promotions
            .fetch_add(snapshot.promotions, Ordering::Relaxed);
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
