use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use blogcache_core::{CacheError, Tier};
use blogcache_engine::CacheManager;
use blogcache_storage::{FileStorage, MemoryStorage, StorageAdapter, StorageError};
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    entries::{delete_entry, get_entry, put_entry},
    health::health_check,
    invalidate::{invalidate_all, invalidate_pattern, invalidate_type, queue_invalidation},
    maintenance::{cleanup, mark_popular, warm},
    metrics::metrics_handler,
    stats::{export_cache, get_stats},
};
use crate::middleware::{RequestIdLayer, request_logging};
use crate::settings::Settings;
use crate::source::StaticContentSource;
use crate::state::AppState;

/// Failure while assembling the cache from settings.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open durable storage: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to load posts from '{dir}': {source}")]
    Content {
        dir: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Builds the cache manager described by the settings.
pub fn build_manager(settings: &Settings) -> Result<CacheManager, StartupError> {
    let session: Arc<dyn StorageAdapter> = match settings.storage.session_quota_bytes {
        Some(quota) => Arc::new(MemoryStorage::with_quota("session", quota)),
        None => Arc::new(MemoryStorage::new("session")),
    };

    let mut builder = CacheManager::builder()
        .settings(settings.cache.clone())
        .storage(Tier::Session, session);

    if let Some(dir) = &settings.storage.durable_dir {
        let mut storage = FileStorage::open(dir)?;
        if let Some(quota) = settings.storage.durable_quota_bytes {
            storage = storage.with_quota(quota);
        }
        builder = builder.storage(Tier::Durable, Arc::new(storage));
    }

    if let Some(dir) = &settings.content.posts_dir {
        let source = StaticContentSource::load(dir).map_err(|source| StartupError::Content {
            dir: dir.display().to_string(),
            source,
        })?;
        builder = builder.source(Arc::new(source));
    }

    Ok(builder.build()?)
}

/// Creates the admin router over the given state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/cache", delete(invalidate_all))
        .route("/cache/stats", get(get_stats))
        .route("/cache/export", get(export_cache))
        .route(
            "/cache/entries/{key}",
            get(get_entry).put(put_entry).delete(delete_entry),
        )
        .route("/cache/types/{content_type}", delete(invalidate_type))
        .route("/cache/invalidate", post(invalidate_pattern))
        .route("/cache/queue", post(queue_invalidation))
        .route("/cache/warm", post(warm))
        .route("/cache/popular", post(mark_popular))
        .route("/cache/cleanup", post(cleanup))
        .with_state(state)
        .layer(middleware::from_fn(
            crate::metrics::http::http_metrics_middleware,
        ))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .layer(RequestIdLayer)
}

/// Serves until Ctrl+C or SIGTERM, then shuts the cache down.
pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), io::Error> {
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.manager().shutdown();
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
