use axum::{
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppError};
use crate::metrics::stream;
use crate::middleware::outcome;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    create_router_with(state, Router::new())
}

/// Like [`create_router`], with `extra` routes mounted behind the same
/// middleware stack.
pub fn create_router_with(state: Arc<AppState>, extra: Router<Arc<AppState>>) -> Router {
    let mut router = Router::new()
        // ── Pages ───────────────────────────────────────────────
        .route("/", get(handlers::pages::index))
        .route("/index", get(handlers::pages::index))
        .route("/do_task", get(handlers::pages::do_task))
        // ── Metrics summary ─────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream));

    // ── Scrape target (registry-backed variant only) ────────────
    if state.metrics.kind().serves_scrape() {
        router = router.route("/metrics", get(stream::scrape));
    }

    router
        .merge(extra)
        .fallback(handlers::pages::not_found)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            outcome::track_outcome,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail, "handler panicked");

    AppError::Internal("internal server error".into()).into_response()
}
