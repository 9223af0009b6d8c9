//! Lectura y escritura de entradas individuales.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use blogcache_core::{CacheKey, Priority, Tier};
use blogcache_engine::{InvalidateOneOptions, InvalidationReport, SetOptions};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Body de `PUT /cache/entries/{key}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEntryRequest {
    pub payload: Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Tiers a escribir; por defecto memory y durable
    #[serde(default)]
    pub tiers: Option<Vec<Tier>>,
}

impl PutEntryRequest {
    fn options(&self) -> SetOptions {
        let mut options = SetOptions::default();
        if let Some(ttl_ms) = self.ttl_ms {
            options = options.with_ttl(ttl_ms);
        }
        if let Some(priority) = self.priority {
            options = options.with_priority(priority);
        }
        if let Some(tiers) = &self.tiers {
            options = options.with_tiers(tiers.clone());
        }
        options
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteEntryParams {
    pub cascade: Option<bool>,
}

fn parse_key(raw: &str) -> Result<CacheKey, AppError> {
    CacheKey::parse(raw).map_err(AppError::from)
}

/// GET /cache/entries/{key}
#[instrument(skip_all, fields(key = %key))]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let parsed = parse_key(&key)?;
    state
        .manager()
        .get(&parsed)
        .map(Json)
        .ok_or(AppError::NotFound { key })
}

/// PUT /cache/entries/{key}
#[instrument(skip_all, fields(key = %key))]
pub async fn put_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<PutEntryRequest>,
) -> Result<StatusCode, AppError> {
    if body.ttl_ms == Some(0) {
        return Err(AppError::BadRequest("ttlMs must be greater than zero".to_string()));
    }

    let parsed = parse_key(&key)?;
    let options = body.options();
    let written = state.manager().set(&parsed, body.payload, &options);

    if written == 0 {
        return Err(AppError::Unavailable(format!(
            "no tier accepted the write for '{}'",
            key
        )));
    }

    tracing::debug!(key = %key, tiers = written, "Entry stored");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cache/entries/{key}
/// Invalida una entrada; en cascada invalida tambien los listados.
#[instrument(skip_all, fields(key = %key))]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<DeleteEntryParams>,
) -> Result<Json<InvalidationReport>, AppError> {
    let parsed = parse_key(&key)?;
    let options = InvalidateOneOptions {
        cascade: params.cascade.unwrap_or(true),
    };

    let report = state
        .manager()
        .invalidate_one(parsed.as_str(), options)
        .await;
    Ok(Json(report))
}
