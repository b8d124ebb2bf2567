pub mod backend;
pub mod factory;
pub mod otel;
pub mod prometheus;
pub mod stream;
pub mod summary;

pub use backend::{DurationRecorder, MetricsBackend, ScopedTiming, TimingDecorator};
pub use factory::{get_metrics_backend, get_metrics_backend_with, reset_metrics_backend, BackendSlot};
pub use otel::OtelMetrics;
pub use self::prometheus::PrometheusMetrics;
pub use summary::{
    BucketSample, BucketTally, CounterKind, CounterSample, MetricsSummary, BUCKET_BOUNDS,
};
