use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::BackendKind;
use crate::error::Result;

use super::summary::MetricsSummary;

// ─── Contract ────────────────────────────────────────────────────

/// Sink for one completed latency measurement.
pub trait DurationRecorder: Send + Sync {
    fn record(&self, elapsed: Duration);
}

/// The capability every telemetry backend offers request handlers.
///
/// Increments and timing are fire-and-forget: they never fail and never
/// block on an exporter. `get_metrics_summary` never mutates state.
pub trait MetricsBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn increment_requests(&self);
    fn increment_successful(&self);
    fn increment_4xx(&self);
    fn increment_5xx(&self);

    /// Where timing scopes deliver their samples.
    fn recorder(&self) -> &dyn DurationRecorder;

    fn get_metrics_summary(&self) -> MetricsSummary;

    /// Native exposition text, for backends that are scraped rather than
    /// pushed. `Ok(None)` means there is nothing to scrape.
    fn scrape(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Release whatever the backend holds outside itself (registered
    /// collectors, exporter threads). Called when the process-wide slot
    /// is reset.
    fn teardown(&self) {}

    /// Start timing. The sample is recorded when the returned guard goes
    /// out of scope, whichever way that happens.
    fn scoped_timing(&self) -> ScopedTiming<'_> {
        ScopedTiming::start(self.recorder())
    }

    fn scoped_timing_decorator(&self) -> TimingDecorator<'_> {
        TimingDecorator {
            recorder: self.recorder(),
        }
    }
}

// ─── Scoped timing ───────────────────────────────────────────────

/// Guard that records exactly one sample: on drop, or on [`stop`].
///
/// Each guard owns its start instant, so nested and overlapping scopes
/// measure independently.
///
/// [`stop`]: ScopedTiming::stop
#[must_use = "the sample is recorded when the guard is dropped"]
pub struct ScopedTiming<'a> {
    recorder: &'a dyn DurationRecorder,
    start: Instant,
    recorded: bool,
}

impl<'a> ScopedTiming<'a> {
    pub fn start(recorder: &'a dyn DurationRecorder) -> Self {
        Self {
            recorder,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Close the scope now and return what was recorded.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.recorder.record(elapsed);
        }
        elapsed
    }
}

impl Drop for ScopedTiming<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

// ─── Decorator ───────────────────────────────────────────────────

/// Wraps units of work in a [`ScopedTiming`]. Results, errors and panics
/// of the work pass through untouched.
#[derive(Clone, Copy)]
pub struct TimingDecorator<'a> {
    recorder: &'a dyn DurationRecorder,
}

impl<'a> TimingDecorator<'a> {
    /// Time a single invocation.
    pub fn run<R>(&self, work: impl FnOnce() -> R) -> R {
        let _timing = ScopedTiming::start(self.recorder);
        work()
    }

    /// Decorate a callable; every call of the result is timed. Multiple
    /// arguments travel as a tuple.
    pub fn wrap<A, R, F>(self, work: F) -> impl Fn(A) -> R + 'a
    where
        F: Fn(A) -> R + 'a,
    {
        move |args| {
            let _timing = ScopedTiming::start(self.recorder);
            work(args)
        }
    }

    /// Time a future from first poll to completion (or to being dropped).
    pub async fn instrument<F>(self, work: F) -> F::Output
    where
        F: Future,
    {
        let _timing = ScopedTiming::start(self.recorder);
        work.await
    }
}
