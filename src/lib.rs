//! A small web application that reports request metrics through one of
//! two interchangeable backends: a pull-based Prometheus registry or a
//! push-based OpenTelemetry meter provider.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use metrics::MetricsBackend;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// The process-wide metrics backend; handlers, middleware and the
    /// SSE stream all go through this one instance.
    pub metrics: Arc<dyn MetricsBackend>,

    /// Work simulated by `/do_task` when the caller gives no `seconds`.
    pub default_task: Duration,
}

impl AppState {
    pub fn new(metrics: Arc<dyn MetricsBackend>, default_task: Duration) -> Self {
        Self {
            metrics,
            default_task,
        }
    }
}
