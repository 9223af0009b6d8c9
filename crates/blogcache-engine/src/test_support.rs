//! Shared fixtures for the unit tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use blogcache_core::{CacheError, ListQuery, ManualClock, Result};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::source::ContentSource;

pub fn clock(start_ms: u64) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_ms))
}

/// Content source returning canned payloads and failing for chosen slugs.
#[derive(Debug, Default)]
pub struct MockSource {
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(slugs: &[&str]) -> Self {
        let source = Self::new();
        source
            .failing
            .lock()
            .extend(slugs.iter().map(|s| s.to_string()));
        source
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_content_list(&self, query: &ListQuery) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "posts": [], "page": query.page, "limit": query.limit }))
    }

    async fn fetch_content_item(&self, slug: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(slug) {
            return Err(CacheError::fetch_failure(
                format!("post:{slug}"),
                "backend returned 500",
            ));
        }
        Ok(json!({ "post": { "slug": slug, "title": format!("Post {slug}") } }))
    }

    async fn fetch_categories(&self) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "categories": [{ "slug": "design", "name": "Design" }] }))
    }
}
