//! Metrics endpoint handler.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blogcache_core::Tier;

use crate::state::AppState;

/// GET /metrics
///
/// Refresca los gauges de entradas por tier antes de renderizar.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(prometheus) = state.prometheus() else {
        return (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response();
    };

    let cache = state.manager().cache();
    for tier in Tier::ALL {
        cache
            .metrics()
            .update_entry_count(tier, cache.tier(tier).len());
    }

    prometheus.render().into_response()
}
