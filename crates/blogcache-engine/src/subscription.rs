//! Active-use tracking for cache keys.
//!
//! A component that renders data for a key holds a [`Subscription`]
//! while it does. Cleanup keeps entries with subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    counts: Mutex<HashMap<String, usize>>,
}

/// Reference counts of active subscribers per key.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `key` until the returned guard is dropped.
    #[must_use = "the subscription ends when the guard is dropped"]
    pub fn subscribe(&self, key: impl Into<String>) -> Subscription {
        let key = key.into();
        *self.inner.counts.lock().entry(key.clone()).or_insert(0) += 1;
        Subscription {
            key,
            inner: Arc::clone(&self.inner),
        }
    }

    /// True if at least one guard for `key` is alive.
    pub fn is_active(&self, key: &str) -> bool {
        self.inner.counts.lock().contains_key(key)
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.counts.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys with subscribers.
    pub fn active_keys(&self) -> usize {
        self.inner.counts.lock().len()
    }
}

/// Guard returned by [`SubscriptionRegistry::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    key: String,
    inner: Arc<Inner>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut counts = self.inner.counts.lock();
        if let Some(count) = counts.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.key);
            }
        }
    }
}
