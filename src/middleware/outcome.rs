use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::AppState;

/// Counts every request by outcome once the response is known:
///
///   http_requests            always
///   http_successful_request  status below 400
///   http_error_4xx / _5xx    client / server errors
///
/// Telemetry endpoints (summary JSON, SSE, and `/metrics` when the backend
/// serves a scrape) are not counted.
pub async fn track_outcome(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let response = next.run(req).await;

    if is_telemetry_path(&path, state.metrics.kind().serves_scrape()) {
        return response;
    }

    let status = response.status();
    let metrics = &state.metrics;
    metrics.increment_requests();
    if status.is_server_error() {
        metrics.increment_5xx();
    } else if status.is_client_error() {
        metrics.increment_4xx();
    } else {
        metrics.increment_successful();
    }

    debug!(%method, %path, status = status.as_u16(), "request counted");
    response
}

fn is_telemetry_path(path: &str, scrape_mounted: bool) -> bool {
    (scrape_mounted && path == "/metrics")
        || path == "/api/metrics"
        || path.starts_with("/api/metrics/")
}
