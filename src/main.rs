use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prom_metrics_app::config::{get_backend_type, task_duration};
use prom_metrics_app::error::{Error, Result};
use prom_metrics_app::metrics::get_metrics_backend;
use prom_metrics_app::{server, AppState};

/// Demo web application with swappable metrics backends.
///
/// The backend itself is chosen through `METRICS_BACKEND` and the
/// `OTEL_*` variables, not through flags.
#[derive(Parser, Debug)]
#[command(name = "prom-metrics-app")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address the HTTP server binds to
    #[arg(long, env = "APP_ADDR", default_value = "0.0.0.0:5000")]
    addr: String,

    /// Seconds of work `/do_task` simulates when no `seconds` is given
    #[arg(long, env = "TASK_SECONDS", default_value = "5")]
    task_seconds: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "starting prom-metrics-app");

    // ── 1. Resolve the metrics backend ───────────────────────────
    let requested = get_backend_type();
    let backend = get_metrics_backend()?;
    if backend.kind() != requested {
        warn!(%requested, resolved = %backend.kind(), "backend was resolved before startup");
    }
    info!(backend = %backend.kind(), "metrics backend ready");

    // ── 2. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState::new(
        backend.clone(),
        task_duration(args.task_seconds)?,
    ));

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr: SocketAddr = args
        .addr
        .parse()
        .map_err(|e| Error::Config(format!("invalid APP_ADDR {:?}: {e}", args.addr)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "server listening");
    info!("metrics JSON at http://{addr}/api/metrics, SSE at /api/metrics/stream");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 5. Flush the backend ─────────────────────────────────────
    backend.teardown();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "opentelemetry=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
