use std::fmt;

use serde::Serialize;

// ─── Metric identity ─────────────────────────────────────────────

/// Upper bounds (seconds) of the request latency histogram. Shared by
/// both backends so their summaries line up bucket for bucket.
pub const BUCKET_BOUNDS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

pub const HISTOGRAM_NAME: &str = "request_processing_seconds";
pub const INF_LABEL: &str = "+Inf";

/// The four outcome counters every backend maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Requests,
    Successful,
    ClientErrors,
    ServerErrors,
}

impl CounterKind {
    pub const ALL: [CounterKind; 4] = [
        CounterKind::Successful,
        CounterKind::Requests,
        CounterKind::ClientErrors,
        CounterKind::ServerErrors,
    ];

    /// Metric name as registered with the telemetry library.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::Requests => "http_requests",
            Self::Successful => "http_successful_request",
            Self::ClientErrors => "http_error_4xx",
            Self::ServerErrors => "http_error_5xx",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Requests => "Total HTTP counts",
            Self::Successful => "Successful HTTP counts",
            Self::ClientErrors => "4xx error count",
            Self::ServerErrors => "5xx error count",
        }
    }

    /// Key of this counter inside the serialized summary.
    pub fn summary_key(&self) -> &'static str {
        match self {
            Self::Requests => "http_requests",
            Self::Successful => "http_successful_request",
            Self::ClientErrors => "http_4xx_errors",
            Self::ServerErrors => "http_5xx_errors",
        }
    }
}

/// Renders a bound the way exposition labels do: `0.005`, `1.0`, `10.0`.
pub fn bucket_label(bound: f64) -> String {
    format!("{bound:?}")
}

// ─── Summary types ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSample {
    pub name: String,
    pub value: f64,
}

/// One row of the histogram section: a cumulative bucket, the count, or
/// the sum. `le` is empty for the latter two.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSample {
    pub name: String,
    pub le: String,
    pub value: f64,
}

/// Running per-bucket counts over [`BUCKET_BOUNDS`].
///
/// `counts[i]` holds samples in `(BUCKET_BOUNDS[i - 1], BUCKET_BOUNDS[i]]`;
/// samples above the last bound only show up in `count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketTally {
    counts: [u64; BUCKET_BOUNDS.len()],
    pub count: u64,
    pub sum: f64,
}

impl BucketTally {
    pub fn observe(&mut self, seconds: f64) {
        let idx = BUCKET_BOUNDS.partition_point(|&bound| bound < seconds);
        if let Some(slot) = self.counts.get_mut(idx) {
            *slot += 1;
        }
        self.count += 1;
        self.sum += seconds;
    }

    /// `(bound, samples at or below bound)` for every bound.
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        BUCKET_BOUNDS
            .iter()
            .zip(self.counts)
            .map(|(&bound, n)| {
                running += n;
                (bound, running)
            })
            .collect()
    }
}

/// Point-in-time view of one backend. Built fresh on every query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub http_successful_request: CounterSample,
    pub http_requests: CounterSample,
    pub http_4xx_errors: CounterSample,
    pub http_5xx_errors: CounterSample,
    pub histogram_buckets: Vec<BucketSample>,
}

/// Raw counter values, in the order the summary needs them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub requests: u64,
    pub successful: u64,
    pub client_errors: u64,
    pub server_errors: u64,
}

impl CounterValues {
    pub fn get(&self, kind: CounterKind) -> u64 {
        match kind {
            CounterKind::Requests => self.requests,
            CounterKind::Successful => self.successful,
            CounterKind::ClientErrors => self.client_errors,
            CounterKind::ServerErrors => self.server_errors,
        }
    }
}

impl MetricsSummary {
    /// Zero counters and an empty distribution.
    pub fn empty() -> Self {
        Self::from_samples(CounterValues::default(), &[])
    }

    /// Assemble a summary from already cumulative bucket counts.
    ///
    /// `buckets` pairs each entry of [`BUCKET_BOUNDS`] with the number of
    /// samples at or below it.
    pub fn from_buckets(
        counters: CounterValues,
        buckets: &[(f64, u64)],
        count: u64,
        sum: f64,
    ) -> Self {
        let bucket_name = format!("{HISTOGRAM_NAME}_bucket");
        let mut histogram_buckets = Vec::with_capacity(buckets.len() + 3);

        for &(bound, cumulative) in buckets {
            histogram_buckets.push(BucketSample {
                name: bucket_name.clone(),
                le: bucket_label(bound),
                value: cumulative as f64,
            });
        }
        histogram_buckets.push(BucketSample {
            name: bucket_name,
            le: INF_LABEL.to_string(),
            value: count as f64,
        });
        histogram_buckets.push(BucketSample {
            name: format!("{HISTOGRAM_NAME}_count"),
            le: String::new(),
            value: count as f64,
        });
        histogram_buckets.push(BucketSample {
            name: format!("{HISTOGRAM_NAME}_sum"),
            le: String::new(),
            value: sum,
        });

        let sample = |kind: CounterKind| CounterSample {
            name: kind.metric_name().to_string(),
            value: counters.get(kind) as f64,
        };

        Self {
            http_successful_request: sample(CounterKind::Successful),
            http_requests: sample(CounterKind::Requests),
            http_4xx_errors: sample(CounterKind::ClientErrors),
            http_5xx_errors: sample(CounterKind::ServerErrors),
            histogram_buckets,
        }
    }

    /// Derive the histogram section from raw latency samples (seconds).
    /// A sample counts toward every bucket whose bound it does not exceed.
    pub fn from_samples(counters: CounterValues, samples: &[f64]) -> Self {
        let mut tally = BucketTally::default();
        for &v in samples {
            tally.observe(v);
        }
        Self::from_tally(counters, &tally)
    }

    pub fn from_tally(counters: CounterValues, tally: &BucketTally) -> Self {
        Self::from_buckets(counters, &tally.cumulative(), tally.count, tally.sum)
    }

    pub fn counter(&self, kind: CounterKind) -> &CounterSample {
        match kind {
            CounterKind::Requests => &self.http_requests,
            CounterKind::Successful => &self.http_successful_request,
            CounterKind::ClientErrors => &self.http_4xx_errors,
            CounterKind::ServerErrors => &self.http_5xx_errors,
        }
    }

    /// The cumulative bucket with the given `le` label (e.g. `"0.005"`, `"+Inf"`).
    pub fn bucket(&self, le: &str) -> Option<&BucketSample> {
        self.histogram_buckets
            .iter()
            .find(|b| !b.le.is_empty() && b.le == le)
    }

    pub fn count(&self) -> f64 {
        self.histogram_value("_count")
    }

    pub fn sum(&self) -> f64 {
        self.histogram_value("_sum")
    }

    fn histogram_value(&self, suffix: &str) -> f64 {
        self.histogram_buckets
            .iter()
            .find(|b| b.le.is_empty() && b.name.ends_with(suffix))
            .map(|b| b.value)
            .unwrap_or(0.0)
    }
}

// ─── Report rendering ────────────────────────────────────────────

/// Human-readable table for the home page.
impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Counters")?;
        for kind in CounterKind::ALL {
            let c = self.counter(kind);
            writeln!(f, "  {:<28} {:>10}", c.name, c.value)?;
        }

        writeln!(f)?;
        writeln!(f, "Histogram ({HISTOGRAM_NAME})")?;
        for b in &self.histogram_buckets {
            if b.le.is_empty() {
                writeln!(f, "  {:<44} {:>10}", b.name, b.value)?;
            } else {
                let label = format!("{}{{le=\"{}\"}}", b.name, b.le);
                writeln!(f, "  {label:<44} {:>10}", b.value)?;
            }
        }
        Ok(())
    }
}
