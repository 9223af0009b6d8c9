use axum::{Json, extract::State};
use blogcache_engine::{CacheExport, StatsSnapshot};

use crate::state::AppState;

/// GET /cache/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.manager().stats())
}

/// GET /cache/export
/// Debug dump: stats, memory-tier entries, settings and lifetime counters.
pub async fn export_cache(State(state): State<AppState>) -> Json<CacheExport> {
    Json(state.manager().export())
}
