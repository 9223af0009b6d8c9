//! Proactive cache population.

use std::sync::{Arc, Weak};
use std::time::Duration;

use blogcache_core::{CacheKey, ContentPolicies, KeyKind, ListQuery, Priority, WarmupSettings};
use futures::future::join_all;
use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::multi_tier::{MultiTierCache, SetOptions};
use crate::source::{ContentSource, fetch_for_key};
use crate::task::{TaskHandle, spawn_periodic};

/// Eviction priority a key gets when written by warmup or refetch.
///
/// Categories, single items and first list pages are kept longest.
pub fn priority_for(key: &CacheKey) -> Priority {
    match key.kind() {
        KeyKind::Categories | KeyKind::Post { .. } => Priority::High,
        KeyKind::Posts(query) if query.page == 1 => Priority::High,
        _ => Priority::Normal,
    }
}

/// Which popular items a warm pass fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PopularRepr", into = "PopularRepr")]
pub enum PopularSelection {
    None,
    /// The slugs marked popular so far.
    #[default]
    Marked,
    /// Explicit slugs.
    Slugs(Vec<String>),
}

/// JSON form: `true`, `false` or a list of slugs.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PopularRepr {
    Flag(bool),
    Slugs(Vec<String>),
}

impl From<PopularRepr> for PopularSelection {
    fn from(repr: PopularRepr) -> Self {
        match repr {
            PopularRepr::Flag(true) => PopularSelection::Marked,
            PopularRepr::Flag(false) => PopularSelection::None,
            PopularRepr::Slugs(slugs) => PopularSelection::Slugs(slugs),
        }
    }
}

impl From<PopularSelection> for PopularRepr {
    fn from(selection: PopularSelection) -> Self {
        match selection {
            PopularSelection::None => PopularRepr::Flag(false),
            PopularSelection::Marked => PopularRepr::Flag(true),
            PopularSelection::Slugs(slugs) => PopularRepr::Slugs(slugs),
        }
    }
}

/// Classes of content to pre-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarmStrategy {
    pub categories: bool,
    pub popular_posts: PopularSelection,
    pub recent_posts: bool,
}

impl Default for WarmStrategy {
    fn default() -> Self {
        Self {
            categories: true,
            popular_posts: PopularSelection::Marked,
            recent_posts: true,
        }
    }
}

impl WarmStrategy {
    /// Categories and the first list page only.
    pub fn essential() -> Self {
        Self {
            categories: true,
            popular_posts: PopularSelection::None,
            recent_posts: true,
        }
    }

    /// Only the given popular slugs.
    pub fn popular(slugs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            categories: false,
            popular_posts: PopularSelection::Slugs(slugs.into_iter().map(Into::into).collect()),
            recent_posts: false,
        }
    }
}

/// Outcome of a warm pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub requested: usize,
    pub warmed: usize,
    /// Already cached and not stale.
    pub skipped: usize,
    /// Keys whose fetch failed.
    pub failed: Vec<String>,
}

/// Keeps the popular slug set and runs warm passes.
pub struct WarmupScheduler {
    cache: Arc<MultiTierCache>,
    source: Option<Arc<dyn ContentSource>>,
    policies: ContentPolicies,
    settings: WarmupSettings,
    popular: Mutex<IndexSet<String>>,
    refresh: Mutex<Option<TaskHandle>>,
}

impl WarmupScheduler {
    pub fn new(
        cache: Arc<MultiTierCache>,
        source: Option<Arc<dyn ContentSource>>,
        policies: ContentPolicies,
        settings: WarmupSettings,
    ) -> Self {
        Self {
            cache,
            source,
            policies,
            settings,
            popular: Mutex::new(IndexSet::new()),
            refresh: Mutex::new(None),
        }
    }

    /// Adds slugs (or `post:` keys) to the popular set. Returns the slugs
    /// that were not marked before.
    pub fn mark_popular<I, S>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut popular = self.popular.lock();
        items
            .into_iter()
            .filter_map(|item| {
                let item = item.as_ref();
                let raw = item.strip_prefix("post:").unwrap_or(item);
                let key = CacheKey::post(raw);
                let slug = key.slug().filter(|s| !s.is_empty())?.to_string();
                popular.insert(slug.clone()).then_some(slug)
            })
            .collect()
    }

    /// Popular slugs in the order they were marked.
    pub fn popular(&self) -> Vec<String> {
        self.popular.lock().iter().cloned().collect()
    }

    pub fn popular_count(&self) -> usize {
        self.popular.lock().len()
    }

    /// Fetches every class the strategy names, skipping fresh entries.
    pub async fn warm(&self, strategy: &WarmStrategy) -> WarmReport {
        let mut keys = Vec::new();

        if strategy.categories {
            keys.push(CacheKey::categories());
        }

        let slugs: Vec<String> = match &strategy.popular_posts {
            PopularSelection::None => Vec::new(),
            PopularSelection::Marked => self.popular(),
            PopularSelection::Slugs(slugs) => slugs.clone(),
        };
        keys.extend(
            slugs
                .iter()
                .take(self.settings.popular_warm_limit)
                .map(CacheKey::post),
        );

        if strategy.recent_posts {
            keys.push(CacheKey::posts(ListQuery::new(
                1,
                self.settings.recent_page_limit,
            )));
        }

        let report = self.warm_keys(keys, false).await;
        info!(
            requested = report.requested,
            warmed = report.warmed,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Cache warming completed"
        );
        report
    }

    /// Refetches the first marked slugs whether or not they are cached.
    pub async fn refresh_popular(&self) -> WarmReport {
        let keys: Vec<CacheKey> = self
            .popular()
            .iter()
            .take(self.settings.popular_refresh_limit)
            .map(CacheKey::post)
            .collect();

        if keys.is_empty() {
            return WarmReport::default();
        }

        let report = self.warm_keys(keys, true).await;
        debug!(warmed = report.warmed, "Popular content refreshed");
        report
    }

    /// Fetches keys concurrently and writes the successes.
    pub async fn warm_keys(&self, keys: Vec<CacheKey>, refresh: bool) -> WarmReport {
        let mut report = WarmReport {
            requested: keys.len(),
            ..Default::default()
        };

        let (jobs, skipped): (Vec<CacheKey>, Vec<CacheKey>) = keys.into_iter().partition(|key| {
            refresh || !self.cache.contains(key.as_str()) || self.cache.is_stale(key.as_str())
        });
        report.skipped = skipped.len();

        let Some(source) = &self.source else {
            if !jobs.is_empty() {
                warn!(count = jobs.len(), "No content source configured, nothing warmed");
            }
            report.failed = jobs.iter().map(ToString::to_string).collect();
            return report;
        };

        let fetches = jobs.into_iter().map(|key| async move {
            let result = fetch_for_key(source.as_ref(), &key).await;
            (key, result)
        });

        for (key, result) in join_all(fetches).await {
            match result {
                Ok(payload) => {
                    let ttl_ms = self.policies.for_type(key.content_type()).hard_ttl_ms;
                    let options = SetOptions::default()
                        .with_ttl(ttl_ms)
                        .with_priority(priority_for(&key));
                    self.cache.set(&key, payload, &options);
                    report.warmed += 1;
                },
                Err(e) => {
                    warn!(key = %key, source = %source.name(), error = %e, "Warm fetch failed");
                    report.failed.push(key.to_string());
                },
            }
        }

        report
    }

    /// Starts the periodic popular refresh, replacing a running one.
    pub fn start(self: &Arc<Self>, period: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = spawn_periodic("popular-refresh", period, move || {
            let weak = weak.clone();
            async move {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.refresh_popular().await;
                }
            }
        });
        *self.refresh.lock() = handle;
    }

    /// Stops the periodic refresh.
    pub fn stop(&self) {
        if let Some(handle) = self.refresh.lock().take() {
            handle.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.refresh
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl std::fmt::Debug for WarmupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmupScheduler")
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("settings", &self.settings)
            .field("popular", &self.popular_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CacheMetrics;
    use crate::test_support::{MockSource, clock};
    use blogcache_core::{CacheSettings, ManualClock, Tier};
    use blogcache_storage::MemoryStorage;
    use serde_json::json;

    fn cache(clock: Arc<ManualClock>) -> Arc<MultiTierCache> {
        Arc::new(MultiTierCache::new(
            &CacheSettings::default(),
            [
                Arc::new(MemoryStorage::new("memory")),
                Arc::new(MemoryStorage::new("session")),
                Arc::new(MemoryStorage::new("durable")),
            ],
            clock,
            Arc::new(CacheMetrics::new()),
        ))
    }

    fn scheduler(
        cache: &Arc<MultiTierCache>,
        source: Option<Arc<dyn ContentSource>>,
    ) -> Arc<WarmupScheduler> {
        Arc::new(WarmupScheduler::new(
            Arc::clone(cache),
            source,
            ContentPolicies::default(),
            WarmupSettings::default(),
        ))
    }

    #[test]
    fn test_priority_for() {
        assert_eq!(priority_for(&CacheKey::categories()), Priority::High);
        assert_eq!(priority_for(&CacheKey::post("a")), Priority::High);
        assert_eq!(
            priority_for(&CacheKey::posts(ListQuery::new(1, 10))),
            Priority::High
        );
        assert_eq!(
            priority_for(&CacheKey::posts(ListQuery::new(2, 10))),
            Priority::Normal
        );
        assert_eq!(priority_for(&CacheKey::search("a", 1, 10)), Priority::Normal);
    }

    #[test]
    fn test_strategy_json_forms() {
        let strategy: WarmStrategy =
            serde_json::from_str(r#"{"popularPosts": ["a", "b"], "recentPosts": false}"#).unwrap();
        assert!(strategy.categories);
        assert!(!strategy.recent_posts);
        assert_eq!(
            strategy.popular_posts,
            PopularSelection::Slugs(vec!["a".into(), "b".into()])
        );

        let strategy: WarmStrategy = serde_json::from_str(r#"{"popularPosts": false}"#).unwrap();
        assert_eq!(strategy.popular_posts, PopularSelection::None);

        let json = serde_json::to_value(WarmStrategy::default()).unwrap();
        assert_eq!(json["popularPosts"], true);
    }

    #[test]
    fn test_mark_popular_dedups_and_keeps_order() {
        let cache = cache(clock(0));
        let scheduler = scheduler(&cache, None);

        let added = scheduler.mark_popular(["b", "post:a", "B", ""]);
        assert_eq!(added, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(scheduler.mark_popular(["a", "c"]), vec!["c".to_string()]);
        assert_eq!(scheduler.popular(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_warm_with_failing_fetcher() {
        let cache = cache(clock(0));
        let source = Arc::new(MockSource::failing_for(&["b"]));
        let scheduler = scheduler(&cache, Some(source));

        let report = scheduler.warm(&WarmStrategy::popular(["a", "b"])).await;

        assert_eq!(report.requested, 2);
        assert_eq!(report.warmed, 1);
        assert_eq!(report.failed, vec!["post:b".to_string()]);
        assert!(cache.get(&CacheKey::post("a")).is_some());
        assert!(cache.get(&CacheKey::post("b")).is_none());
    }

    #[tokio::test]
    async fn test_warm_default_strategy() {
        let cache = cache(clock(0));
        let scheduler = scheduler(&cache, Some(Arc::new(MockSource::new())));
        scheduler.mark_popular(["a"]);

        let report = scheduler.warm(&WarmStrategy::default()).await;
        assert_eq!(report.warmed, 3);

        let entry = cache.tier(Tier::Durable).peek("categories:all").unwrap();
        assert_eq!(entry.priority, Priority::High);
        assert_eq!(entry.ttl_ms, 30 * 60_000);
        assert!(cache.contains("post:a"));
        assert!(cache.contains("posts:1_10_null_null"));
    }

    #[tokio::test]
    async fn test_warm_skips_fresh_entries_but_not_stale_ones() {
        let cache = cache(clock(0));
        let source = Arc::new(MockSource::new());
        let scheduler = scheduler(&cache, Some(source.clone()));

        cache.set(&CacheKey::post("a"), json!("cached"), &SetOptions::default());
        cache.set(&CacheKey::post("b"), json!("cached"), &SetOptions::default());
        cache.mark_stale("post:b");

        let report = scheduler.warm(&WarmStrategy::popular(["a", "b"])).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.warmed, 1);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.get(&CacheKey::post("a")), Some(json!("cached")));
        assert!(!cache.is_stale("post:b"));
    }

    #[tokio::test]
    async fn test_warm_caps_popular_posts() {
        let cache = cache(clock(0));
        let scheduler = scheduler(&cache, Some(Arc::new(MockSource::new())));
        let slugs: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();

        let report = scheduler.warm(&WarmStrategy::popular(slugs)).await;
        assert_eq!(report.requested, 5);
        assert!(!cache.contains("post:p5"));
    }

    #[tokio::test]
    async fn test_warm_without_source_reports_failures() {
        let cache = cache(clock(0));
        let scheduler = scheduler(&cache, None);

        let report = scheduler.warm(&WarmStrategy::popular(["a"])).await;
        assert_eq!(report.failed, vec!["post:a".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_popular_refetches_cached_entries() {
        let cache = cache(clock(0));
        let source = Arc::new(MockSource::new());
        let scheduler = scheduler(&cache, Some(source.clone()));
        cache.set(&CacheKey::post("a"), json!("old"), &SetOptions::default());
        scheduler.mark_popular(["a"]);

        let report = scheduler.refresh_popular().await;
        assert_eq!(report.warmed, 1);
        assert_eq!(
            cache.get(&CacheKey::post("a")).unwrap()["post"]["slug"],
            "a"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let cache = cache(clock(0));
        let source = Arc::new(MockSource::new());
        let scheduler = scheduler(&cache, Some(source.clone()));
        scheduler.mark_popular(["a"]);

        scheduler.start(Duration::from_secs(60));
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(source.calls(), 2);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.calls(), 2);
        assert!(!scheduler.is_running());
    }
}
