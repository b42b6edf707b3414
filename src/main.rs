use std::net::SocketAddr;
use std::sync::Arc;

use pizza_telemetry::logging::{init_logging, LogFormat};
use pizza_telemetry::{server, AppState, Telemetry, TelemetryConfig};

const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging(LogFormat::from_env(), "info") {
        eprintln!("❌ Cannot initialise logging: {e}");
        std::process::exit(1);
    }

    // ── 1. Load configuration ────────────────────────────────────
    let config = TelemetryConfig::from_env();
    if config.metrics.url.is_none() {
        tracing::info!("METRICS_URL not set, metrics export disabled");
    }
    if config.logging.url.is_none() {
        tracing::info!("LOGGING_URL not set, log shipping disabled");
    }

    // ── 2. Build shared state & start export ─────────────────────
    let state = Arc::new(AppState::new(Telemetry::new(config)));
    let exporter = state.telemetry.start_export();

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state.clone());

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr = std::env::var("TELEMETRY_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "server listening");
    tracing::info!("metrics JSON → /api/metrics, SSE → /api/metrics/stream");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    exporter.stop().await;

    if let Err(e) = served {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
