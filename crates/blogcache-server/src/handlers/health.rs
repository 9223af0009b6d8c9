use axum::{Json, extract::State};
use blogcache_core::Tier;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `UP`, o `DEGRADED` si algun tier quedo deshabilitado
    pub status: String,
    pub version: String,
    /// Tiers deshabilitados en esta sesion
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disabled_tiers: Vec<Tier>,
}

impl HealthResponse {
    pub fn from_disabled(disabled_tiers: Vec<Tier>) -> Self {
        let status = if disabled_tiers.is_empty() { "UP" } else { "DEGRADED" };
        Self {
            status: status.to_string(),
            version: crate::version().to_string(),
            disabled_tiers,
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.manager().cache();
    let disabled = Tier::ALL
        .into_iter()
        .filter(|tier| !cache.tier(*tier).is_available())
        .collect();
    Json(HealthResponse::from_disabled(disabled))
}
