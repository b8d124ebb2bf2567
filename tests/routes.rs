use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::get as get_route;
use axum::Router;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use prom_metrics_app::metrics::{
    CounterKind, MetricsBackend, MetricsSummary, OtelMetrics, PrometheusMetrics,
};
use prom_metrics_app::{server, AppState};

// ─── Helpers ─────────────────────────────────────────────────────

fn prometheus_backend() -> Arc<dyn MetricsBackend> {
    Arc::new(PrometheusMetrics::new(Registry::new()).unwrap())
}

fn otel_backend() -> Arc<dyn MetricsBackend> {
    Arc::new(OtelMetrics::with_provider(SdkMeterProvider::builder().build()))
}

fn app(metrics: Arc<dyn MetricsBackend>) -> Router {
    server::create_router(Arc::new(AppState::new(metrics, Duration::ZERO)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn counter(summary: &MetricsSummary, kind: CounterKind) -> f64 {
    summary.counter(kind).value
}

// ─── Pages ───────────────────────────────────────────────────────

#[tokio::test]
async fn index_counts_success_and_records_latency() {
    for backend in [prometheus_backend(), otel_backend()] {
        let app = app(backend.clone());

        let (status, body) = get(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("Home ("));

        let (status, _) = get(&app, "/index").await;
        assert_eq!(status, StatusCode::OK);

        let summary = backend.get_metrics_summary();
        assert_eq!(counter(&summary, CounterKind::Requests), 2.0);
        assert_eq!(counter(&summary, CounterKind::Successful), 2.0);
        assert_eq!(counter(&summary, CounterKind::ClientErrors), 0.0);
        assert_eq!(summary.count(), 2.0);
    }
}

#[tokio::test]
async fn unknown_route_is_a_counted_404() {
    let backend = prometheus_backend();
    let app = app(backend.clone());

    let (status, body) = get(&app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("/nope"));

    let summary = backend.get_metrics_summary();
    assert_eq!(counter(&summary, CounterKind::Requests), 1.0);
    assert_eq!(counter(&summary, CounterKind::ClientErrors), 1.0);
    assert_eq!(counter(&summary, CounterKind::Successful), 0.0);
}

#[tokio::test]
async fn do_task_times_outer_and_inner_scopes() {
    let backend = prometheus_backend();
    let app = app(backend.clone());

    let (status, body) = get(&app, "/do_task?seconds=0").await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["title"], "Do task");
    assert_eq!(report["requested_secs"], 0.0);

    let summary = backend.get_metrics_summary();
    assert_eq!(summary.count(), 2.0);
    assert_eq!(counter(&summary, CounterKind::Successful), 1.0);
}

#[tokio::test]
async fn failing_task_still_records_and_counts_5xx() {
    let backend = otel_backend();
    let app = app(backend.clone());

    let (status, body) = get(&app, "/do_task?seconds=0&fail=true").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("task failed"));

    let summary = backend.get_metrics_summary();
    assert_eq!(summary.count(), 2.0);
    assert_eq!(counter(&summary, CounterKind::Requests), 1.0);
    assert_eq!(counter(&summary, CounterKind::ServerErrors), 1.0);
    assert_eq!(counter(&summary, CounterKind::Successful), 0.0);
}

#[tokio::test]
async fn negative_seconds_is_rejected() {
    let backend = prometheus_backend();
    let app = app(backend.clone());

    let (status, _) = get(&app, "/do_task?seconds=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let summary = backend.get_metrics_summary();
    assert_eq!(counter(&summary, CounterKind::ClientErrors), 1.0);
    assert_eq!(summary.count(), 0.0);
}

// ─── Telemetry endpoints ─────────────────────────────────────────

#[tokio::test]
async fn scrape_exposes_registry_text() {
    let backend = prometheus_backend();
    let app = app(backend.clone());

    get(&app, "/").await;
    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("http_requests 1"));
    assert!(body.contains("request_processing_seconds_bucket"));

    // Scrapes are not counted as traffic
    let summary = backend.get_metrics_summary();
    assert_eq!(counter(&summary, CounterKind::Requests), 1.0);
}

#[tokio::test]
async fn push_backend_has_no_scrape_route() {
    let backend = otel_backend();
    let app = app(backend.clone());

    let (status, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Without a scrape route this is an ordinary miss
    let summary = backend.get_metrics_summary();
    assert_eq!(counter(&summary, CounterKind::Requests), 1.0);
    assert_eq!(counter(&summary, CounterKind::ClientErrors), 1.0);
    assert_eq!(counter(&summary, CounterKind::Successful), 0.0);
}

#[tokio::test]
async fn summary_json_has_every_section() {
    let backend = prometheus_backend();
    let app = app(backend.clone());

    get(&app, "/").await;
    let (status, body) = get(&app, "/api/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    for key in [
        "http_successful_request",
        "http_requests",
        "http_4xx_errors",
        "http_5xx_errors",
        "histogram_buckets",
    ] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["http_requests"]["value"], 1.0);
    assert_eq!(json["histogram_buckets"].as_array().unwrap().len(), 17);
}

// ─── Panics ──────────────────────────────────────────────────────

async fn explode() -> &'static str {
    panic!("handler blew up")
}

#[tokio::test]
async fn handler_panic_is_a_counted_500() {
    for backend in [prometheus_backend(), otel_backend()] {
        let state = Arc::new(AppState::new(backend.clone(), Duration::ZERO));
        let extra = Router::new().route("/explode", get_route(explode));
        let app = server::create_router_with(state, extra);

        let (status, body) = get(&app, "/explode").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], 500);
        assert_eq!(json["error"], "internal server error");

        let summary = backend.get_metrics_summary();
        assert_eq!(counter(&summary, CounterKind::Requests), 1.0);
        assert_eq!(counter(&summary, CounterKind::ServerErrors), 1.0);
        assert_eq!(counter(&summary, CounterKind::Successful), 0.0);
    }
}
