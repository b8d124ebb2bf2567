use thiserror::Error;

/// Failures that can surface outside the metrics core.
///
/// Increments, timing scopes and summary queries never fail; only
/// constructing a backend, encoding the scrape output and starting the
/// server return one of these.
#[derive(Debug, Error)]
pub enum Error {
    /// Registering (or encoding) prometheus collectors failed, most often
    /// because another live instance already owns the metric names.
    #[error("prometheus registry error: {0}")]
    Registration(#[from] prometheus::Error),

    /// The OpenTelemetry exporter could not be built.
    #[error("failed to build metric exporter: {0}")]
    Exporter(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
