use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blogcache_core::CacheError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    /// Entrada no encontrada en ningun tier
    NotFound { key: String },

    /// Parametros invalidos
    BadRequest(String),

    /// Ningun tier acepto la operacion
    Unavailable(String),

    /// Error interno
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidKey { .. } | CacheError::InvalidConfig { .. } => {
                AppError::BadRequest(err.to_string())
            },
            CacheError::StorageUnavailable { .. } | CacheError::QuotaExceeded { .. } => {
                AppError::Unavailable(err.to_string())
            },
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::NotFound { key } => (
                StatusCode::NOT_FOUND,
                "Not Found",
                format!("No cached entry for '{}'", key),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg),
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable", msg)
            },
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                msg,
            ),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
