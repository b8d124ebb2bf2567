use axum::{
    extract::{Query, State},
    http::Uri,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::MetricsBackend;
use crate::AppState;

use super::AppError;

/// Longest task a caller may ask `/do_task` to simulate.
const MAX_TASK_SECS: f64 = 30.0;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TaskParams {
    /// Simulated work in seconds; the server default when absent
    pub seconds: Option<f64>,

    /// Fail after the work is done, to exercise the 5xx path
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub title: &'static str,
    pub requested_secs: f64,
    pub worked_secs: f64,
}

// ─── GET / and /index ────────────────────────────────────────────

/// Home page: a plain-text report of the live summary.
pub async fn index(State(state): State<Arc<AppState>>) -> String {
    let _timing = state.metrics.scoped_timing();

    let summary = state.metrics.get_metrics_summary();
    format!("Home ({} backend)\n\n{summary}", state.metrics.kind())
}

// ─── GET /do_task ────────────────────────────────────────────────

/// Simulates a slow request. The whole handler body is one timed scope
/// and the inner work is timed again on its own.
pub async fn do_task(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TaskParams>,
) -> Result<Json<TaskReport>, AppError> {
    let requested = params
        .seconds
        .unwrap_or_else(|| state.default_task.as_secs_f64());
    if !requested.is_finite() || requested < 0.0 {
        return Err(AppError::BadRequest(format!(
            "seconds must be between 0 and {MAX_TASK_SECS}"
        )));
    }
    let requested = requested.min(MAX_TASK_SECS);

    let metrics = state.metrics.as_ref();
    metrics
        .scoped_timing_decorator()
        .instrument(async move {
            let worked = process_request(metrics, Duration::from_secs_f64(requested)).await;

            if params.fail {
                return Err(AppError::Internal("task failed".into()));
            }

            Ok(Json(TaskReport {
                title: "Do task",
                requested_secs: requested,
                worked_secs: worked.as_secs_f64(),
            }))
        })
        .await
}

/// A dummy unit of work that takes some time.
async fn process_request(metrics: &dyn MetricsBackend, duration: Duration) -> Duration {
    let timing = metrics.scoped_timing();
    tokio::time::sleep(duration).await;
    timing.stop()
}

// ─── Fallback ────────────────────────────────────────────────────

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}
