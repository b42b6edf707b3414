use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::registry::RegistrySnapshot;
use super::system::SystemMetrics;
use crate::telemetry::DeliveryCounts;
use crate::AppState;

/// Everything the local metrics endpoints expose.
#[derive(Debug, Clone, Serialize)]
pub struct LocalMetrics {
    #[serde(flatten)]
    pub registry: RegistrySnapshot,
    pub system: SystemMetrics,
    pub delivery: DeliveryCounts,
}

fn local_metrics(state: &AppState) -> LocalMetrics {
    let t = &state.telemetry;
    LocalMetrics {
        registry: t.registry().snapshot(),
        system: t.sampler().sample(),
        delivery: t.stats().counts(),
    }
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON snapshot, handy for curl.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<LocalMetrics> {
    Json(local_metrics(&state))
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `LocalMetrics` snapshot as JSON every 500 ms.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let json = serde_json::to_string(&local_metrics(&state)).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
