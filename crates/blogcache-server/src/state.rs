//! Application state.

use std::sync::Arc;

use blogcache_engine::CacheManager;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    manager: Arc<CacheManager>,
    prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            prometheus: None,
        }
    }

    /// Enables `GET /metrics` with the given recorder handle.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Returns the cache manager.
    pub fn manager(&self) -> &CacheManager {
        self.manager.as_ref()
    }

    pub fn prometheus(&self) -> Option<&PrometheusHandle> {
        self.prometheus.as_ref()
    }
}
