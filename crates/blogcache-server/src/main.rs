//! Blogcache admin server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use blogcache_engine::WarmStrategy;
use blogcache_server::metrics::init_metrics;
use blogcache_server::{AppState, build_manager, run_server, settings};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_file = std::env::var_os("BLOGCACHE_CONFIG").map(PathBuf::from);
    let settings =
        settings::load(config_file.as_deref()).context("failed to load settings")?;
    let addr = settings.socket_addr()?;

    tracing::info!(
        "Starting Blogcache Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!(
        durable_dir = ?settings.storage.durable_dir,
        posts_dir = ?settings.content.posts_dir,
        "Storage configured"
    );

    let prometheus = init_metrics().context("failed to install metrics recorder")?;
    let manager = Arc::new(build_manager(&settings).context("failed to build cache")?);

    if settings.server.background_tasks {
        manager.start_background_tasks();
    }
    if settings.server.warm_on_start {
        let report = manager.warm_cache(&WarmStrategy::default()).await;
        tracing::info!(
            warmed = report.warmed,
            failed = report.failed.len(),
            "Startup warm completed"
        );
    }

    let state = AppState::new(manager).with_prometheus(prometheus);
    run_server(addr, state).await?;

    Ok(())
}
