//! Cache invalidation endpoint handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use blogcache_core::ContentType;
use blogcache_engine::{InvalidateOneOptions, InvalidateOptions, InvalidationReport};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Query de invalidacion: `?force=true&tags=category:design,slug:intro`.
#[derive(Debug, Default, Deserialize)]
pub struct InvalidateParams {
    pub force: Option<bool>,
    pub tags: Option<String>,
}

impl InvalidateParams {
    fn options(&self) -> InvalidateOptions {
        let tags = self
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty());

        let options = InvalidateOptions {
            force: self.force.unwrap_or(false),
            ..Default::default()
        };
        options.with_tags(tags)
    }
}

/// Body de `POST /cache/invalidate`.
#[derive(Debug, Deserialize)]
pub struct InvalidatePatternRequest {
    /// Patron glob, por ejemplo `posts:*`.
    pub pattern: String,
}

/// DELETE /cache/types/{content_type}
/// Invalida todas las entradas de un tipo de contenido segun su edad.
#[instrument(skip_all, fields(content_type = %content_type))]
pub async fn invalidate_type(
    State(state): State<AppState>,
    Path(content_type): Path<String>,
    Query(params): Query<InvalidateParams>,
) -> Result<Json<InvalidationReport>, AppError> {
    let content_type: ContentType = content_type.parse()?;
    let report = state
        .manager()
        .invalidate_by_type(content_type, &params.options())
        .await;
    Ok(Json(report))
}

/// DELETE /cache
/// Invalida toda la cache.
#[instrument(skip_all)]
pub async fn invalidate_all(
    State(state): State<AppState>,
    Query(params): Query<InvalidateParams>,
) -> Json<InvalidationReport> {
    let report = state.manager().invalidate_all(&params.options()).await;
    Json(report)
}

/// POST /cache/invalidate
#[instrument(skip_all, fields(pattern = %body.pattern))]
pub async fn invalidate_pattern(
    State(state): State<AppState>,
    Json(body): Json<InvalidatePatternRequest>,
) -> Result<Json<InvalidationReport>, AppError> {
    if body.pattern.trim().is_empty() {
        return Err(AppError::BadRequest("pattern cannot be empty".to_string()));
    }
    let report = state.manager().invalidate_matching(body.pattern.trim()).await;
    Ok(Json(report))
}

/// Body de `POST /cache/queue`.
#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    /// Claves a invalidar. Vacio = barrido de expiradas.
    #[serde(default)]
    pub keys: Vec<String>,
    pub cascade: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queued: usize,
}

/// POST /cache/queue
/// Encola la invalidacion para el siguiente drenado periodico.
#[instrument(skip_all, fields(keys = body.keys.len()))]
pub async fn queue_invalidation(
    State(state): State<AppState>,
    Json(body): Json<QueueRequest>,
) -> (StatusCode, Json<QueueResponse>) {
    let options = InvalidateOneOptions {
        cascade: body.cascade.unwrap_or(true),
    };
    let queued = state.manager().queue_invalidation(body.keys, options);
    (StatusCode::ACCEPTED, Json(QueueResponse { queued }))
}
