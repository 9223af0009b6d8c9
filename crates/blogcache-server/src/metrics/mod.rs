//! Prometheus export for the cache and HTTP metrics.

pub mod http;
pub mod setup;

pub use setup::{init_metrics, test_handle};
