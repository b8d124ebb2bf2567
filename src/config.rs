use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

// ─── Environment keys ────────────────────────────────────────────

pub const METRICS_BACKEND_ENV: &str = "METRICS_BACKEND";
pub const OTEL_EXPORTER_ENV: &str = "OTEL_EXPORTER";
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const OTLP_INSECURE_ENV: &str = "OTEL_EXPORTER_OTLP_INSECURE";
pub const SERVICE_NAME_ENV: &str = "OTEL_SERVICE_NAME";
pub const EXPORT_INTERVAL_ENV: &str = "OTEL_METRIC_EXPORT_INTERVAL";

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318/v1/metrics";
const DEFAULT_SERVICE_NAME: &str = "prom-metrics-app";
const DEFAULT_EXPORT_INTERVAL_MS: u64 = 10_000;

// ─── Backend selector ────────────────────────────────────────────

/// Which telemetry model backs the process-wide metrics instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pull model: in-process registry scraped at `/metrics`.
    #[default]
    Prometheus,
    /// Push model: OpenTelemetry SDK with a periodic exporter.
    Otel,
}

impl BackendKind {
    /// Case-insensitive. Unknown or empty values fall back to prometheus.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "otel" => Self::Otel,
            _ => Self::Prometheus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prometheus => "prometheus",
            Self::Otel => "otel",
        }
    }

    /// Whether this backend is read by scraping `/metrics`.
    pub fn serves_scrape(&self) -> bool {
        matches!(self, Self::Prometheus)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the OTel backend ships its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExporterKind {
    #[default]
    Console,
    Otlp,
}

impl ExporterKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "otlp" => Self::Otlp,
            _ => Self::Console,
        }
    }
}

// ─── Settings ────────────────────────────────────────────────────

/// Export-side knobs for the OpenTelemetry backend. None of these affect
/// what `get_metrics_summary()` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct OtelSettings {
    pub exporter: ExporterKind,
    pub endpoint: String,
    pub insecure: bool,
    pub service_name: String,
    pub export_interval: Duration,
}

impl Default for OtelSettings {
    fn default() -> Self {
        Self {
            exporter: ExporterKind::Console,
            endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            insecure: true,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            export_interval: Duration::from_millis(DEFAULT_EXPORT_INTERVAL_MS),
        }
    }
}

/// Everything the backend factory reads at first resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSettings {
    pub backend: BackendKind,
    pub otel: OtelSettings,
}

impl MetricsSettings {
    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = OtelSettings::default();

        let backend = lookup(METRICS_BACKEND_ENV)
            .map(|v| BackendKind::parse(&v))
            .unwrap_or_default();

        let exporter = lookup(OTEL_EXPORTER_ENV)
            .map(|v| ExporterKind::parse(&v))
            .unwrap_or_default();

        let endpoint = lookup(OTLP_ENDPOINT_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.endpoint);

        // Only a literal "true" keeps the connection insecure once the key is set
        let insecure = lookup(OTLP_INSECURE_ENV)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.insecure);

        let service_name = lookup(SERVICE_NAME_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.service_name);

        let export_interval = lookup(EXPORT_INTERVAL_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.export_interval);

        Self {
            backend,
            otel: OtelSettings {
                exporter,
                endpoint,
                insecure,
                service_name,
                export_interval,
            },
        }
    }
}

/// Turn a seconds value from the command line into a task duration.
pub fn task_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| {
        Error::Config(format!("TASK_SECONDS={seconds} is not a usable duration: {e}"))
    })
}

/// The backend the environment currently asks for.
///
/// Does not resolve (or even look at) the singleton, so it can disagree
/// with the live instance if the environment changed after startup.
pub fn get_backend_type() -> BackendKind {
    MetricsSettings::from_env().backend
}
