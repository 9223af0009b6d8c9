//! # Blogcache Engine
//!
//! Multi-tier cache for blog content.
//!
//! This crate coordinates a set of [`TierCache`]s, each wrapping one
//! storage adapter, behind a [`CacheManager`] facade.
//!
//! ## Features
//!
//! - Read-through promotion from slower tiers into faster ones
//! - Fan-out writes that skip failing tiers instead of failing
//! - Priority-aware LRU eviction per tier
//! - Age-based invalidation: immediate, background refetch or mark-stale
//! - Warmup of categories, popular and recent content through a [`ContentSource`]
//! - Cancellable background tasks and persisted lifetime metrics
//! - Broadcast events for invalidations and periodic performance checks
//! - Queued invalidations drained in batches
//!
//! ## Example
//!
//! ```ignore
//! use blogcache_engine::{CacheManager, SetOptions};
//! use blogcache_core::CacheKey;
//! use serde_json::json;
//!
//! let manager = CacheManager::builder().build()?;
//!
//! let key = CacheKey::post("intro");
//! manager.set(&key, json!({"title": "Intro"}), &SetOptions::default().with_ttl(60_000));
//! assert!(manager.get(&key).is_some());
//! ```

pub mod events;
pub mod invalidation;
pub mod manager;
pub mod metrics;
pub mod monitor;
pub mod multi_tier;
pub mod source;
pub mod subscription;
pub mod task;
pub mod tier;
pub mod warmup;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use events::{CacheEvent, EVENT_CAPACITY, EventBus, PerformanceReport};
pub use invalidation::{
    InvalidateOneOptions, InvalidateOptions, InvalidationCoordinator, InvalidationReport, Strategy,
};
pub use manager::{
    CacheExport, CacheManager, CacheManagerBuilder, CleanupOptions, ExportedEntry, StatsSnapshot,
    TierStats,
};
pub use metrics::{CacheMetrics, MetricsSnapshot, TierCounters, register_cache_metrics};
pub use monitor::PerformanceMonitor;
pub use multi_tier::{GetOptions, MultiTierCache, SetOptions};
pub use source::{ContentSource, fetch_for_key};
pub use subscription::{Subscription, SubscriptionRegistry};
pub use task::{TaskHandle, TaskSet, spawn_deferred, spawn_periodic};
pub use tier::TierCache;
pub use warmup::{PopularSelection, WarmReport, WarmStrategy, WarmupScheduler, priority_for};

// Re-export the lower crates for consumers
pub use blogcache_core;
pub use blogcache_storage;
