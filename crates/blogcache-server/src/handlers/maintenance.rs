//! Warmup, popular content and cleanup.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use blogcache_engine::{CleanupOptions, WarmReport, WarmStrategy};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PopularRequest {
    pub slugs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PopularResponse {
    /// Slugs marcados por primera vez
    pub added: Vec<String>,
    pub total: usize,
}

/// Body de `POST /cache/cleanup`; lo omitido usa la configuracion.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub max_age_ms: Option<u64>,
    pub keep_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

/// POST /cache/warm
#[instrument(skip_all)]
pub async fn warm(
    State(state): State<AppState>,
    Json(strategy): Json<WarmStrategy>,
) -> Json<WarmReport> {
    Json(state.manager().warm_cache(&strategy).await)
}

/// POST /cache/popular
/// Marca posts como populares; el warm corre en segundo plano.
#[instrument(skip_all, fields(count = body.slugs.len()))]
pub async fn mark_popular(
    State(state): State<AppState>,
    Json(body): Json<PopularRequest>,
) -> Result<(StatusCode, Json<PopularResponse>), AppError> {
    if body.slugs.is_empty() {
        return Err(AppError::BadRequest("slugs cannot be empty".to_string()));
    }

    let manager = state.manager();
    let added = manager.mark_as_popular(&body.slugs);
    let total = manager.popular().len();
    Ok((StatusCode::ACCEPTED, Json(PopularResponse { added, total })))
}

/// POST /cache/cleanup
#[instrument(skip_all)]
pub async fn cleanup(
    State(state): State<AppState>,
    Json(body): Json<CleanupRequest>,
) -> Json<CleanupResponse> {
    let manager = state.manager();
    let defaults = CleanupOptions::from(manager.settings().cleanup);
    let options = CleanupOptions {
        max_age_ms: body.max_age_ms.unwrap_or(defaults.max_age_ms),
        keep_active: body.keep_active.unwrap_or(defaults.keep_active),
    };

    Json(CleanupResponse {
        removed: manager.cleanup_cache(options),
    })
}
