use axum::{
    middleware as axum_mw,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::metrics::stream;
use crate::middleware::telemetry;
use crate::AppState;

/// Builds the `Router` serving the local metrics views, wrapped in the
/// telemetry middleware. Host applications merge their own routes in front
/// of this with [`instrument`].
pub fn create_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        // ── Liveness ────────────────────────────────────────────
        .route("/api/health", get(health))
        .with_state(state.clone());

    instrument(routes, state)
}

/// Apply the telemetry middleware and CORS to any router.
pub fn instrument(router: Router, state: Arc<AppState>) -> Router {
    router
        .layer(axum_mw::from_fn_with_state(
            state,
            telemetry::telemetry_middleware,
        ))
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
