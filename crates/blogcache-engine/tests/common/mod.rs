//! Shared helpers for the engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use blogcache_core::{CacheError, ListQuery, ManualClock, Result};
use blogcache_engine::{CacheManager, ContentSource};
use serde_json::{Value, json};

pub const MINUTE: u64 = 60_000;

/// Content source serving generated posts, failing for some slugs.
#[derive(Debug, Default)]
pub struct FixtureSource {
    failing: HashSet<String>,
    fetches: AtomicUsize,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(slugs: &[&str]) -> Self {
        Self {
            failing: slugs.iter().map(|s| s.to_string()).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn fetch_content_list(&self, query: &ListQuery) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "posts": [{ "slug": "intro" }],
            "page": query.page,
            "limit": query.limit,
            "source": "fixture",
        }))
    }

    async fn fetch_content_item(&self, slug: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(slug) {
            return Err(CacheError::fetch_failure(format!("post:{slug}"), "upstream timeout"));
        }
        Ok(json!({ "post": { "slug": slug, "source": "fixture" } }))
    }

    async fn fetch_categories(&self) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "categories": ["design", "rust"] }))
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(1_700_000_000_000))
}

/// Manager with in-memory tiers over the given source.
pub fn manager(clock: Arc<ManualClock>, source: FixtureSource) -> CacheManager {
    CacheManager::builder()
        .clock(clock)
        .source(Arc::new(source))
        .build()
        .expect("default settings are valid")
}
