//! HTTP handlers del API de administracion.

pub mod entries;
pub mod health;
pub mod invalidate;
pub mod maintenance;
pub mod metrics;
pub mod stats;
