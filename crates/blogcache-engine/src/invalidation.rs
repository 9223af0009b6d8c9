//! Cache invalidation by content type, key and glob pattern.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use blogcache_core::{CacheKey, ContentPolicies, ContentType, InvalidationSettings};
use glob::Pattern;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::events::{CacheEvent, EventBus};
use crate::multi_tier::{MultiTierCache, SetOptions};
use crate::source::{ContentSource, fetch_for_key};
use crate::task::{TaskSet, spawn_deferred};
use crate::warmup::priority_for;

/// Options for type-wide invalidation.
#[derive(Debug, Clone, Default)]
pub struct InvalidateOptions {
    /// Remove every matching key regardless of age.
    pub force: bool,
    /// Only keys carrying at least one of these tags. Empty means all.
    pub tags: Vec<String>,
}

impl InvalidateOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Options for single-key invalidation.
#[derive(Debug, Clone, Copy)]
pub struct InvalidateOneOptions {
    /// Also invalidate the list types that may hold a copy.
    pub cascade: bool,
}

impl Default for InvalidateOneOptions {
    fn default() -> Self {
        Self { cascade: true }
    }
}

/// How a key is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Removed from every tier now.
    Immediate,
    /// Refetched after a short delay, removed if that fails.
    Background,
    /// Flagged stale, payload still served.
    MarkStale,
}

/// Outcome of an invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub content_types: Vec<ContentType>,
    /// Keys considered after tag filtering.
    pub matched: usize,
    /// Keys left alone because their tags did not match.
    pub skipped: usize,
    pub immediate: usize,
    pub background: usize,
    pub stale: usize,
    /// Removal batches executed.
    pub batches: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    /// Keys acted on, whatever the strategy. Carried by events only.
    #[serde(skip)]
    pub keys: Vec<String>,
}

impl InvalidationReport {
    fn merge(&mut self, other: InvalidationReport) {
        for ct in other.content_types {
            if !self.content_types.contains(&ct) {
                self.content_types.push(ct);
            }
        }
        self.matched += other.matched;
        self.skipped += other.skipped;
        self.immediate += other.immediate;
        self.background += other.background;
        self.stale += other.stale;
        self.batches += other.batches;
        self.patterns.extend(other.patterns);
        self.keys.extend(other.keys);
    }
}

/// An invalidation request waiting for the next queue drain.
#[derive(Debug, Clone)]
struct QueuedInvalidation {
    keys: Vec<String>,
    cascade: bool,
}

/// Clears the drain flag even if the drain future is dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Plan {
    immediate: Vec<String>,
    background: Vec<String>,
    stale: Vec<String>,
    skipped: usize,
}

/// Resolves keys per content type and applies an age-based strategy.
pub struct InvalidationCoordinator {
    cache: Arc<MultiTierCache>,
    policies: ContentPolicies,
    settings: InvalidationSettings,
    source: Option<Arc<dyn ContentSource>>,
    background: TaskSet,
    events: EventBus,
    queue: Mutex<VecDeque<QueuedInvalidation>>,
    draining: AtomicBool,
}

impl InvalidationCoordinator {
    pub fn new(
        cache: Arc<MultiTierCache>,
        policies: ContentPolicies,
        settings: InvalidationSettings,
        source: Option<Arc<dyn ContentSource>>,
    ) -> Self {
        Self {
            cache,
            policies,
            settings,
            source,
            background: TaskSet::new(),
            events: EventBus::new(),
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Publishes invalidation events on a shared bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Picks the strategy for an entry of `content_type` aged `age_ms`.
    pub fn classify(&self, content_type: ContentType, age_ms: u64, force: bool) -> Strategy {
        let policy = self.policies.for_type(content_type);
        if force || age_ms > policy.hard_ttl_ms {
            Strategy::Immediate
        } else if age_ms > policy.soft_ttl_ms {
            Strategy::Background
        } else {
            Strategy::MarkStale
        }
    }

    /// Invalidates every key of a content type.
    pub async fn invalidate(
        &self,
        content_type: ContentType,
        options: &InvalidateOptions,
    ) -> InvalidationReport {
        let report = self.invalidate_type(content_type, options).await;
        self.publish(&report, false);
        report
    }

    async fn invalidate_type(
        &self,
        content_type: ContentType,
        options: &InvalidateOptions,
    ) -> InvalidationReport {
        let plan = self.plan(content_type, options, false);
        let report = self.execute(content_type, plan).await;

        info!(
            content_type = %content_type,
            force = options.force,
            immediate = report.immediate,
            background = report.background,
            stale = report.stale,
            skipped = report.skipped,
            "Cache invalidated"
        );
        report
    }

    /// Removes one key and, when cascading from a single item or the
    /// category listing, invalidates the list types too.
    pub async fn invalidate_one(
        &self,
        key: &str,
        options: InvalidateOneOptions,
    ) -> InvalidationReport {
        self.invalidate_keys(&[key.to_string()], options).await
    }

    /// Removes the given keys now. Keys outside the cache namespace are
    /// refused. The list types are invalidated once when any key cascades.
    pub async fn invalidate_keys(
        &self,
        keys: &[String],
        options: InvalidateOneOptions,
    ) -> InvalidationReport {
        let report = self.remove_keys(keys, options).await;
        if report.matched > 0 {
            self.publish(&report, options.cascade);
        }
        report
    }

    async fn remove_keys(&self, keys: &[String], options: InvalidateOneOptions) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        let mut cascades = false;

        for key in keys {
            let Some(content_type) = ContentType::of(key) else {
                warn!(key = %key, "Refusing to invalidate a key outside the cache namespace");
                continue;
            };
            self.cache.remove(key);
            if !report.content_types.contains(&content_type) {
                report.content_types.push(content_type);
            }
            report.matched += 1;
            report.immediate += 1;
            report.keys.push(key.clone());
            cascades |= !content_type.is_list();
        }

        if options.cascade && cascades {
            for list_type in ContentType::LISTS {
                let plan = self.plan(list_type, &InvalidateOptions::default(), true);
                report.merge(self.execute(list_type, plan).await);
            }
        }

        if report.matched > 0 {
            info!(
                keys = keys.len(),
                cascade = options.cascade,
                immediate = report.immediate,
                background = report.background,
                "Cache keys invalidated"
            );
        }
        report
    }

    /// Removes every cache-owned key from every tier and cancels pending
    /// refetches. With tags, only matching keys of every type go.
    pub async fn invalidate_all(&self, options: &InvalidateOptions) -> InvalidationReport {
        let cancelled = self.background.cancel_all();

        if !options.tags.is_empty() {
            let forced = InvalidateOptions::forced().with_tags(options.tags.iter().cloned());
            let mut report = InvalidationReport::default();
            for content_type in ContentType::ALL {
                report.merge(self.invalidate_type(content_type, &forced).await);
            }
            self.publish(&report, false);
            return report;
        }

        let dropped = {
            let mut queue = self.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };

        let keys = self.cache.keys();
        self.cache.clear_owned();

        info!(
            count = keys.len(),
            cancelled,
            dropped_requests = dropped,
            "All cache entries invalidated"
        );
        let report = InvalidationReport {
            content_types: ContentType::ALL.to_vec(),
            matched: keys.len(),
            immediate: keys.len(),
            batches: usize::from(!keys.is_empty()),
            keys,
            ..Default::default()
        };
        self.publish(&report, false);
        report
    }

    /// Removes every cache-owned key matching a glob pattern, e.g.
    /// `posts:*_design_*`.
    pub async fn invalidate_matching(&self, pattern_str: &str) -> InvalidationReport {
        let mut report = InvalidationReport {
            patterns: vec![pattern_str.to_string()],
            ..Default::default()
        };

        let pattern = match Pattern::new(pattern_str) {
            Ok(p) => p,
            Err(e) => {
                debug!(pattern = %pattern_str, error = %e, "Invalid glob pattern");
                return report;
            },
        };

        let keys: Vec<String> = self
            .cache
            .keys()
            .into_iter()
            .filter(|key| pattern.matches(key))
            .collect();

        for key in &keys {
            if let Some(ct) = ContentType::of(key)
                && !report.content_types.contains(&ct)
            {
                report.content_types.push(ct);
            }
        }
        report.matched = keys.len();
        report.immediate = keys.len();
        report.batches = self.remove_in_batches(&keys).await;

        info!(
            pattern = %pattern_str,
            count = keys.len(),
            "Cache entries invalidated by pattern"
        );
        report.keys = keys;
        self.publish(&report, false);
        report
    }

    /// Queues keys for the next drain instead of removing them now. An
    /// empty key list asks for an expired-entry sweep. Returns the queue
    /// length.
    pub fn enqueue(&self, keys: Vec<String>, options: InvalidateOneOptions) -> usize {
        let mut queue = self.queue.lock();
        queue.push_back(QueuedInvalidation {
            keys,
            cascade: options.cascade,
        });
        debug!(queued = queue.len(), "Invalidation request queued");
        queue.len()
    }

    /// Requests waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Handles up to `queue_batch_size` queued requests in order. A drain
    /// already in progress makes this a no-op. Returns requests handled.
    pub async fn process_queue(&self) -> usize {
        if self.draining.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let _guard = DrainGuard(&self.draining);

        let batch: Vec<QueuedInvalidation> = {
            let mut queue = self.queue.lock();
            let take = queue.len().min(self.settings.queue_batch_size.max(1));
            queue.drain(..take).collect()
        };

        for request in &batch {
            if request.keys.is_empty() {
                let removed = self.cache.cleanup_expired();
                debug!(removed, "Queued sweep of expired entries");
            } else {
                let options = InvalidateOneOptions {
                    cascade: request.cascade,
                };
                self.invalidate_keys(&request.keys, options).await;
            }
        }

        if !batch.is_empty() {
            debug!(handled = batch.len(), left = self.queued(), "Invalidation queue drained");
        }
        batch.len()
    }

    /// Number of scheduled refetches not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.background.pending()
    }

    /// Cancels every scheduled refetch.
    pub fn cancel_pending(&self) -> usize {
        self.background.cancel_all()
    }

    /// Waits for scheduled refetches to complete.
    pub async fn wait_pending(&self) {
        self.background.wait_all().await;
    }

    fn plan(&self, content_type: ContentType, options: &InvalidateOptions, cascade: bool) -> Plan {
        let now = self.cache.clock().now_ms();
        let mut plan = Plan::default();

        for key in self.cache.keys_for(content_type) {
            let entry = self.cache.oldest_entry(&key);

            if !options.tags.is_empty() {
                let tags = match &entry {
                    Some(e) if !e.tags.is_empty() => e.tags.clone(),
                    _ => CacheKey::parse(&key).map(|k| k.tags()).unwrap_or_default(),
                };
                if !tags.iter().any(|tag| options.tags.contains(tag)) {
                    plan.skipped += 1;
                    continue;
                }
            }

            // no valid copy left: only expired or corrupt leftovers
            let strategy = match &entry {
                Some(e) => self.classify(content_type, e.age_ms(now), options.force),
                None => Strategy::Immediate,
            };

            match strategy {
                Strategy::Immediate => plan.immediate.push(key),
                Strategy::MarkStale if !cascade => plan.stale.push(key),
                Strategy::Background | Strategy::MarkStale => plan.background.push(key),
            }
        }

        plan
    }

    fn publish(&self, report: &InvalidationReport, cascade: bool) {
        self.events.publish(CacheEvent::Invalidation {
            keys: report.keys.clone(),
            cascade,
            report: report.clone(),
        });
    }

    async fn execute(&self, content_type: ContentType, plan: Plan) -> InvalidationReport {
        let mut report = InvalidationReport {
            content_types: vec![content_type],
            matched: plan.immediate.len() + plan.background.len() + plan.stale.len(),
            skipped: plan.skipped,
            immediate: plan.immediate.len(),
            background: plan.background.len(),
            stale: plan.stale.len(),
            ..Default::default()
        };
        report.keys = plan
            .immediate
            .iter()
            .chain(&plan.background)
            .chain(&plan.stale)
            .cloned()
            .collect();

        report.batches = self.remove_in_batches(&plan.immediate).await;

        for key in plan.background {
            self.schedule_refetch(content_type, key);
        }

        for key in &plan.stale {
            self.cache.mark_stale(key);
        }

        report
    }

    /// Removes keys in batches with a pause between batches.
    async fn remove_in_batches(&self, keys: &[String]) -> usize {
        let batch_size = self.settings.batch_size.max(1);
        let delay = Duration::from_millis(self.settings.batch_delay_ms);
        let mut batches = 0;

        for (i, batch) in keys.chunks(batch_size).enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for key in batch {
                self.cache.remove(key);
            }
            batches += 1;
            debug!(batch = batches, size = batch.len(), "Invalidation batch removed");
        }

        batches
    }

    fn schedule_refetch(&self, content_type: ContentType, key: String) {
        let cache = Arc::clone(&self.cache);
        let source = self.source.clone();
        let ttl_ms = self.policies.for_type(content_type).hard_ttl_ms;
        let delay = Duration::from_millis(self.settings.background_delay_ms);
        let task_key = key.clone();

        let handle = spawn_deferred("refetch", delay, move || async move {
            refetch(&cache, source.as_deref(), &task_key, ttl_ms).await;
        });

        if handle.is_none() {
            self.cache.remove(&key);
        }
        self.background.push(handle);
    }
}

/// Replaces a key with fresh content, or drops it when that is impossible.
async fn refetch(
    cache: &MultiTierCache,
    source: Option<&dyn ContentSource>,
    raw_key: &str,
    ttl_ms: u64,
) {
    let (Some(source), Ok(key)) = (source, CacheKey::parse(raw_key)) else {
        cache.remove(raw_key);
        debug!(key = %raw_key, "No refetch possible, entry removed");
        return;
    };

    match fetch_for_key(source, &key).await {
        Ok(payload) => {
            cache.remove(raw_key);
            let options = SetOptions::default()
                .with_ttl(ttl_ms)
                .with_priority(priority_for(&key));
            cache.set(&key, payload, &options);
            debug!(key = %key, source = %source.name(), "Entry refreshed in background");
        },
        Err(e) => {
            warn!(key = %key, error = %e, "Background refetch failed, entry removed");
            cache.remove(raw_key);
        },
    }
}

impl std::fmt::Debug for InvalidationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationCoordinator")
            .field("policies", &self.policies)
            .field("settings", &self.settings)
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("background", &self.background)
            .field("queued", &self.queued())
            .finish()
    }
}
