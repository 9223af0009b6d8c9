//! Metrics setup and initialization.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Buckets de histogramas en segundos, de 50 microsegundos a 5 segundos.
/// Las operaciones de cache viven en la parte baja.
const DURATION_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5,
    1.0, 2.5, 5.0,
];

/// Instala el recorder global y registra las descripciones de metricas.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)?
        .install_recorder()?;

    blogcache_engine::register_cache_metrics();
    super::http::register_http_metrics();

    info!("Metrics system initialized");
    Ok(handle)
}

/// Handle de un recorder no instalado, para tests y benchmarks.
pub fn test_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
