//! Blogcache Server - admin HTTP API over a multi-tier blog cache
//!
//! Exposes stats, entry reads and writes, invalidation, warmup and cleanup
//! of a [`blogcache_engine::CacheManager`], plus a Prometheus endpoint.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod settings;
pub mod source;
pub mod state;

pub use error::AppError;
pub use handlers::health::HealthResponse;
pub use server::{StartupError, build_manager, create_router, run_server};
pub use settings::{LoadError, Settings};
pub use source::StaticContentSource;
pub use state::AppState;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
