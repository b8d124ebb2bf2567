use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{BackendKind, ExporterKind, OtelSettings};
use crate::error::{Error, Result};

use super::backend::{DurationRecorder, MetricsBackend};
use super::summary::{
    BucketTally, CounterKind, CounterValues, MetricsSummary, BUCKET_BOUNDS, HISTOGRAM_NAME,
};

const METER_NAME: &str = "prom-metrics-app";

/// Upper bound on a single OTLP push, so a stalled collector cannot pin
/// the reader thread.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Exporter wiring ─────────────────────────────────────────────

/// Build a meter provider whose periodic reader pushes to the exporter
/// named in `settings`.
pub fn build_meter_provider(settings: &OtelSettings) -> Result<SdkMeterProvider> {
    let resource = Resource::builder()
        .with_service_name(settings.service_name.clone())
        .build();
    let builder = SdkMeterProvider::builder().with_resource(resource);

    let provider = match settings.exporter {
        ExporterKind::Console => {
            info!(interval = ?settings.export_interval, "exporting metrics to stdout");
            let exporter = opentelemetry_stdout::MetricExporter::default();
            let reader = PeriodicReader::builder(exporter)
                .with_interval(settings.export_interval)
                .build();
            builder.with_reader(reader).build()
        }
        ExporterKind::Otlp => {
            let endpoint = resolve_endpoint(&settings.endpoint, settings.insecure);
            info!(%endpoint, interval = ?settings.export_interval, "exporting metrics over OTLP/HTTP");

            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .with_timeout(EXPORT_TIMEOUT)
                .build()
                .map_err(|e| Error::Exporter(e.to_string()))?;
            let reader = PeriodicReader::builder(exporter)
                .with_interval(settings.export_interval)
                .build();
            builder.with_reader(reader).build()
        }
    };

    Ok(provider)
}

/// A secure connection forces `https`; an insecure one takes the
/// endpoint as given.
fn resolve_endpoint(endpoint: &str, insecure: bool) -> String {
    match endpoint.strip_prefix("http://") {
        Some(rest) if !insecure => {
            warn!(endpoint, "secure OTLP export requested, switching endpoint to https");
            format!("https://{rest}")
        }
        _ => endpoint.to_string(),
    }
}

// ─── Shadow state ────────────────────────────────────────────────

/// Local copy of everything written to the SDK. The SDK instruments are
/// write-only, so summaries are answered from here.
#[derive(Default)]
struct Shadow {
    requests: AtomicU64,
    successful: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    histogram: Mutex<BucketTally>,
}

impl Shadow {
    fn counter(&self, kind: CounterKind) -> &AtomicU64 {
        match kind {
            CounterKind::Requests => &self.requests,
            CounterKind::Successful => &self.successful,
            CounterKind::ClientErrors => &self.client_errors,
            CounterKind::ServerErrors => &self.server_errors,
        }
    }

    fn counters(&self) -> CounterValues {
        CounterValues {
            requests: self.requests.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

// ─── Backend ─────────────────────────────────────────────────────

/// Push-model backend over the OpenTelemetry metrics SDK.
pub struct OtelMetrics {
    provider: SdkMeterProvider,
    http_successful_request: Counter<u64>,
    http_requests: Counter<u64>,
    http_4xx_errors: Counter<u64>,
    http_5xx_errors: Counter<u64>,
    request_time: Histogram<f64>,
    shadow: Shadow,
}

impl OtelMetrics {
    /// Build the exporter pipeline from `settings` and install the
    /// provider globally.
    pub fn new(settings: &OtelSettings) -> Result<Self> {
        let provider = build_meter_provider(settings)?;
        global::set_meter_provider(provider.clone());
        Ok(Self::with_provider(provider))
    }

    /// Create the instruments on a caller-supplied provider.
    pub fn with_provider(provider: SdkMeterProvider) -> Self {
        let meter = provider.meter(METER_NAME);

        let counter = |kind: CounterKind| {
            meter
                .u64_counter(kind.metric_name())
                .with_description(kind.description())
                .with_unit("1")
                .build()
        };

        Self {
            http_successful_request: counter(CounterKind::Successful),
            http_requests: counter(CounterKind::Requests),
            http_4xx_errors: counter(CounterKind::ClientErrors),
            http_5xx_errors: counter(CounterKind::ServerErrors),
            request_time: meter
                .f64_histogram(HISTOGRAM_NAME)
                .with_description("Time spent processing request")
                .with_unit("s")
                .with_boundaries(BUCKET_BOUNDS.to_vec())
                .build(),
            shadow: Shadow::default(),
            provider,
        }
    }

    fn sdk_counter(&self, kind: CounterKind) -> &Counter<u64> {
        match kind {
            CounterKind::Requests => &self.http_requests,
            CounterKind::Successful => &self.http_successful_request,
            CounterKind::ClientErrors => &self.http_4xx_errors,
            CounterKind::ServerErrors => &self.http_5xx_errors,
        }
    }

    // SDK write and shadow write stay together so they cannot drift
    fn add(&self, kind: CounterKind) {
        self.sdk_counter(kind).add(1, &[]);
        self.shadow.counter(kind).fetch_add(1, Ordering::Relaxed);
    }
}

impl DurationRecorder for OtelMetrics {
    fn record(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        self.request_time.record(seconds, &[]);
        self.shadow.histogram.lock().observe(seconds);
    }
}

impl MetricsBackend for OtelMetrics {
    fn kind(&self) -> BackendKind {
        BackendKind::Otel
    }

    fn increment_requests(&self) {
        self.add(CounterKind::Requests);
    }

    fn increment_successful(&self) {
        self.add(CounterKind::Successful);
    }

    fn increment_4xx(&self) {
        self.add(CounterKind::ClientErrors);
    }

    fn increment_5xx(&self) {
        self.add(CounterKind::ServerErrors);
    }

    fn recorder(&self) -> &dyn DurationRecorder {
        self
    }

    fn get_metrics_summary(&self) -> MetricsSummary {
        let counters = self.shadow.counters();
        let tally = self.shadow.histogram.lock().clone();
        MetricsSummary::from_tally(counters, &tally)
    }

    fn teardown(&self) {
        if let Err(e) = self.provider.shutdown() {
            warn!(error = ?e, "meter provider shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fresh() -> OtelMetrics {
        OtelMetrics::with_provider(SdkMeterProvider::builder().build())
    }

    #[test]
    fn counters_track_increments() {
        let m = fresh();
        m.increment_requests();
        m.increment_requests();
        m.increment_requests();
        m.increment_successful();

        let s = m.get_metrics_summary();
        assert_eq!(s.http_requests.value, 3.0);
        assert_eq!(s.http_successful_request.value, 1.0);
    }

    #[test]
    fn every_counter_moves_by_one() {
        let m = fresh();
        for kind in CounterKind::ALL {
            let before = m.get_metrics_summary().counter(kind).value;
            match kind {
                CounterKind::Requests => m.increment_requests(),
                CounterKind::Successful => m.increment_successful(),
                CounterKind::ClientErrors => m.increment_4xx(),
                CounterKind::ServerErrors => m.increment_5xx(),
            }
            assert_eq!(m.get_metrics_summary().counter(kind).value, before + 1.0);
        }
    }

    #[test]
    fn fresh_backend_reports_zeroes() {
        assert_eq!(fresh().get_metrics_summary(), MetricsSummary::empty());
    }

    #[test]
    fn instant_work_lands_in_smallest_bucket() {
        let m = fresh();
        {
            let _t = m.scoped_timing();
        }
        let s = m.get_metrics_summary();
        assert!(s.bucket("0.005").unwrap().value >= 1.0);
        assert!(s.bucket("+Inf").is_some());
    }

    #[test]
    fn ten_millisecond_sample_is_summed() {
        let m = fresh();
        let before = m.get_metrics_summary().sum();
        {
            let _t = m.scoped_timing();
            std::thread::sleep(Duration::from_millis(10));
        }
        let s = m.get_metrics_summary();
        assert_eq!(s.count(), 1.0);
        assert!(s.sum() > before);
        assert!(s.sum() >= 0.01 && s.sum() < 0.5);
    }

    #[test]
    fn failing_work_still_records() {
        let m = fresh();
        let result: std::result::Result<(), &str> = m.scoped_timing_decorator().run(|| Err("boom"));
        assert_eq!(result, Err("boom"));
        assert_eq!(m.get_metrics_summary().count(), 1.0);
    }

    #[test]
    fn summary_does_not_mutate() {
        let m = fresh();
        m.increment_5xx();
        m.record(Duration::from_millis(30));
        assert_eq!(m.get_metrics_summary(), m.get_metrics_summary());
    }

    #[test]
    fn spread_samples_fill_cumulative_buckets() {
        let m = fresh();
        for ms in [3, 20, 20, 400, 12_000] {
            m.record(Duration::from_millis(ms));
        }

        let s = m.get_metrics_summary();
        assert_eq!(s.bucket("0.005").unwrap().value, 1.0);
        assert_eq!(s.bucket("0.025").unwrap().value, 3.0);
        assert_eq!(s.bucket("0.5").unwrap().value, 4.0);
        assert_eq!(s.bucket("10.0").unwrap().value, 4.0);
        assert_eq!(s.bucket("+Inf").unwrap().value, 5.0);
        assert!((s.sum() - 12.443).abs() < 1e-9);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let m = Arc::new(fresh());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        m.increment_4xx();
                        m.record(Duration::from_micros(100));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let s = m.get_metrics_summary();
        assert_eq!(s.http_4xx_errors.value, 4_000.0);
        assert_eq!(s.count(), 4_000.0);
        assert_eq!(s.bucket("0.005").unwrap().value, 4_000.0);
    }

    #[test]
    fn console_pipeline_builds_with_custom_service_name() {
        let settings = OtelSettings {
            service_name: "custom-service".to_string(),
            ..OtelSettings::default()
        };
        let m = OtelMetrics::new(&settings).unwrap();
        m.increment_requests();
        assert_eq!(m.kind(), BackendKind::Otel);
        m.teardown();
    }

    #[test]
    fn secure_export_upgrades_plain_http() {
        assert_eq!(
            resolve_endpoint("http://collector:4318/v1/metrics", false),
            "https://collector:4318/v1/metrics"
        );
        assert_eq!(
            resolve_endpoint("http://collector:4318/v1/metrics", true),
            "http://collector:4318/v1/metrics"
        );
        assert_eq!(
            resolve_endpoint("https://collector:4318/v1/metrics", true),
            "https://collector:4318/v1/metrics"
        );
    }
}
