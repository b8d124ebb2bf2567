//! Process-wide metrics backend.
//!
//! The first call to [`get_metrics_backend`] reads the configuration,
//! builds the selected backend and caches it; every later call gets the
//! same instance, whatever the configuration says by then.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::info;

use crate::config::{BackendKind, MetricsSettings};
use crate::error::Result;

use super::backend::MetricsBackend;
use super::otel::OtelMetrics;
use super::prometheus::PrometheusMetrics;

/// Holder for at most one backend. Unresolved until the first
/// `get_or_init`, resolved from then on until `reset`.
#[derive(Default)]
pub struct BackendSlot {
    inner: Mutex<Option<Arc<dyn MetricsBackend>>>,
}

impl BackendSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached backend, building it with `init` if the slot is
    /// empty. A failed `init` leaves the slot empty.
    pub fn get_or_init<F>(&self, init: F) -> Result<Arc<dyn MetricsBackend>>
    where
        F: FnOnce() -> Result<Arc<dyn MetricsBackend>>,
    {
        // Held across `init` so racing first callers cannot both build one
        let mut slot = self.inner.lock();
        if let Some(backend) = slot.as_ref() {
            return Ok(backend.clone());
        }

        let backend = init()?;
        *slot = Some(backend.clone());
        Ok(backend)
    }

    pub fn current(&self) -> Option<Arc<dyn MetricsBackend>> {
        self.inner.lock().clone()
    }

    /// Drop the cached backend after tearing it down. Test isolation only.
    pub fn reset(&self) {
        if let Some(backend) = self.inner.lock().take() {
            backend.teardown();
        }
    }
}

static METRICS_BACKEND: Lazy<BackendSlot> = Lazy::new(BackendSlot::new);

/// Build a new backend of the configured kind.
///
/// The prometheus variant registers with the default registry, so this
/// fails if another prometheus backend is still registered there.
pub fn build_backend(settings: &MetricsSettings) -> Result<Arc<dyn MetricsBackend>> {
    let backend: Arc<dyn MetricsBackend> = match settings.backend {
        BackendKind::Prometheus => Arc::new(PrometheusMetrics::new(
            prometheus::default_registry().clone(),
        )?),
        BackendKind::Otel => Arc::new(OtelMetrics::new(&settings.otel)?),
    };

    info!(backend = %settings.backend, "metrics backend initialised");
    Ok(backend)
}

/// The process-wide backend, resolved from the environment on first use.
pub fn get_metrics_backend() -> Result<Arc<dyn MetricsBackend>> {
    METRICS_BACKEND.get_or_init(|| build_backend(&MetricsSettings::from_env()))
}

/// Like [`get_metrics_backend`], with explicit settings for the first
/// resolution. Ignored once the backend exists.
pub fn get_metrics_backend_with(settings: &MetricsSettings) -> Result<Arc<dyn MetricsBackend>> {
    METRICS_BACKEND.get_or_init(|| build_backend(settings))
}

/// Discard the process-wide backend so the next call re-resolves.
///
/// For test harnesses only; request handling must never call this.
#[doc(hidden)]
pub fn reset_metrics_backend() {
    METRICS_BACKEND.reset();
}
