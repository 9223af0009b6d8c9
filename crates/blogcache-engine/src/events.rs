//! Cache event notifications.
//!
//! Listeners get a [`broadcast`] receiver. A slow listener that falls more
//! than [`EVENT_CAPACITY`] events behind sees `RecvError::Lagged` and
//! misses the oldest events; publishing never blocks the cache.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::invalidation::InvalidationReport;

/// Events buffered per receiver.
pub const EVENT_CAPACITY: usize = 64;

/// Something listeners may want to react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CacheEvent {
    /// Keys were invalidated by type, key, pattern or a full wipe.
    #[serde(rename_all = "camelCase")]
    Invalidation {
        keys: Vec<String>,
        cascade: bool,
        report: InvalidationReport,
    },
    /// Result of a periodic performance check.
    Performance(PerformanceReport),
}

/// What a performance check saw and did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub lookups: u64,
    /// Fraction of lookups served by some tier.
    pub hit_rate: f64,
    pub memory_usage_percent: f64,
    /// Essential content re-warmed because the hit rate was low.
    pub rewarmed: bool,
    pub warmed: usize,
    /// Expired entries swept because the memory tier was nearly full.
    pub expired_removed: usize,
}

/// Sending half shared by everything that publishes events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// New receiver seeing every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sends to current receivers. Without receivers the event is dropped.
    pub fn publish(&self, event: CacheEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event listeners");
        }
    }
}
