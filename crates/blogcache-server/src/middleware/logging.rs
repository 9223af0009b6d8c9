//! Middleware de logging estructurado.

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use super::request_id::REQUEST_ID_HEADER;

/// Logs one line per admin request; 5xx responses at `warn`.
///
/// Must run inside the request id layer so the header is already set.
pub async fn request_logging(
    matched_path: Option<MatchedPath>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let route = matched_path
        .as_ref()
        .map(MatchedPath::as_str)
        .unwrap_or("unmatched")
        .to_string();

    let span = info_span!(
        "admin_request",
        request_id = %request_id,
        method = %request.method(),
        route = %route,
        path = %request.uri().path(),
    );

    async move {
        debug!("Request started");
        let response = next.run(request).await;

        let status = response.status();
        let duration_ms = start.elapsed().as_millis() as u64;
        if status.is_server_error() {
            warn!(status = status.as_u16(), duration_ms, "Request failed");
        } else {
            info!(status = status.as_u16(), duration_ms, "Request completed");
        }
        response
    }
    .instrument(span)
    .await
}
