use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::summary::MetricsSummary;
use crate::handlers::AppError;
use crate::AppState;

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON summary, handy for curl / debugging.

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSummary> {
    Json(state.metrics.get_metrics_summary())
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a fresh `MetricsSummary` as JSON every 500 ms.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let summary = state.metrics.get_metrics_summary();
        let json = serde_json::to_string(&summary).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── GET /metrics ────────────────────────────────────────────────
/// Prometheus scrape target. Only the registry-backed variant has
/// anything to expose; the push variant answers 404.

pub async fn scrape(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    match state.metrics.scrape() {
        Ok(Some(body)) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response()),
        Ok(None) => Err(AppError::NotFound(format!(
            "{} backend has no scrape endpoint",
            state.metrics.kind()
        ))),
        Err(e) => Err(e.into()),
    }
}
