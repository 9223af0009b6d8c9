//! Middleware stack para el servidor HTTP.
//!
//! - `RequestIdLayer`: genera o propaga X-Request-Id
//! - `request_logging`: logging estructurado de requests

mod logging;
mod request_id;

pub use logging::request_logging;
pub use request_id::{MAX_REQUEST_ID_LEN, REQUEST_ID_HEADER, RequestIdLayer, RequestIdMiddleware};
