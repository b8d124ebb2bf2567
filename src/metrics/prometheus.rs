use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use tracing::debug;

use crate::config::BackendKind;
use crate::error::Result;

use super::backend::{DurationRecorder, MetricsBackend};
use super::summary::{CounterKind, CounterValues, MetricsSummary, BUCKET_BOUNDS, HISTOGRAM_NAME};

/// Pull-model backend: counters and the latency histogram live in a
/// prometheus [`Registry`] and are read back directly for summaries.
///
/// Construction registers five collectors under fixed names. A second
/// instance against the same live registry fails with
/// [`Error::Registration`](crate::error::Error::Registration) until the
/// first one is [`unregister`](Self::unregister)ed.
pub struct PrometheusMetrics {
    registry: Registry,
    http_successful_request: IntCounter,
    http_requests: IntCounter,
    http_4xx_errors: IntCounter,
    http_5xx_errors: IntCounter,
    request_time: Histogram,
}

impl PrometheusMetrics {
    pub fn new(registry: Registry) -> Result<Self> {
        let counter = |kind: CounterKind| IntCounter::new(kind.metric_name(), kind.description());

        let metrics = Self {
            http_successful_request: counter(CounterKind::Successful)?,
            http_requests: counter(CounterKind::Requests)?,
            http_4xx_errors: counter(CounterKind::ClientErrors)?,
            http_5xx_errors: counter(CounterKind::ServerErrors)?,
            request_time: Histogram::with_opts(
                HistogramOpts::new(HISTOGRAM_NAME, "Time spent processing request (Histogram)")
                    .buckets(BUCKET_BOUNDS.to_vec()),
            )?,
            registry,
        };

        // All or nothing: a collision leaves the registry as we found it
        let mut registered = 0;
        for collector in metrics.collectors() {
            match metrics.registry.register(collector) {
                Ok(()) => registered += 1,
                Err(e) => {
                    for collector in metrics.collectors().into_iter().take(registered) {
                        let _ = metrics.registry.unregister(collector);
                    }
                    return Err(e.into());
                }
            }
        }

        debug!("registered prometheus metrics backend");
        Ok(metrics)
    }

    /// Remove this instance's collectors from its registry. Safe to call
    /// more than once.
    pub fn unregister(&self) {
        for collector in self.collectors() {
            // NotFound just means it was already removed
            let _ = self.registry.unregister(collector);
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.http_successful_request.clone()),
            Box::new(self.http_requests.clone()),
            Box::new(self.http_4xx_errors.clone()),
            Box::new(self.http_5xx_errors.clone()),
            Box::new(self.request_time.clone()),
        ]
    }

    /// Cumulative buckets, count and sum from one consistent histogram
    /// snapshot.
    fn histogram_snapshot(&self) -> (Vec<(f64, u64)>, u64, f64) {
        let families = self.request_time.collect();
        let Some(metric) = families.first().and_then(|mf| mf.get_metric().first()) else {
            return (BUCKET_BOUNDS.iter().map(|&b| (b, 0)).collect(), 0, 0.0);
        };

        let h = metric.get_histogram();
        let buckets = h
            .get_bucket()
            .iter()
            .map(|b| (b.get_upper_bound(), b.get_cumulative_count()))
            .collect();

        (buckets, h.get_sample_count(), h.get_sample_sum())
    }
}

impl DurationRecorder for PrometheusMetrics {
    fn record(&self, elapsed: Duration) {
        self.request_time.observe(elapsed.as_secs_f64());
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn kind(&self) -> BackendKind {
        BackendKind::Prometheus
    }

    fn increment_requests(&self) {
        self.http_requests.inc();
    }

    fn increment_successful(&self) {
        self.http_successful_request.inc();
    }

    fn increment_4xx(&self) {
        self.http_4xx_errors.inc();
    }

    fn increment_5xx(&self) {
        self.http_5xx_errors.inc();
    }

    fn recorder(&self) -> &dyn DurationRecorder {
        self
    }

    fn get_metrics_summary(&self) -> MetricsSummary {
        let counters = CounterValues {
            requests: self.http_requests.get(),
            successful: self.http_successful_request.get(),
            client_errors: self.http_4xx_errors.get(),
            server_errors: self.http_5xx_errors.get(),
        };
        let (buckets, count, sum) = self.histogram_snapshot();

        MetricsSummary::from_buckets(counters, &buckets, count, sum)
    }

    fn scrape(&self) -> Result<Option<String>> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;

        Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
    }

    fn teardown(&self) {
        self.unregister();
    }
}
