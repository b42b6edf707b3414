use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::logs::{RequestContext, ResponseContext};
use crate::AppState;

/// Bodies larger than this (or of unknown length) are logged as `{}`.
pub const MAX_CAPTURED_BODY: usize = 64 * 1024;

/// Identity resolved by an auth layer or handler. Its presence on the request
/// or response extensions marks the logged request as authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

/// Records every request into the metric registry and ships an access log.
///
/// Also adds a `Server-Timing` header with the handler wall time.
pub async fn telemetry_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let (parts, body) = req.into_parts();

    let mut ctx = RequestContext {
        method: parts.method.to_string(),
        path: parts.uri.path().to_owned(),
        headers: parts.headers.clone(),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
        principal: parts.extensions.get::<Principal>().map(|p| p.0.clone()),
    };

    // ── Request body ────────────────────────────────────────────
    let (req_body, req_text) = match capture(body).await {
        Ok(captured) => captured,
        Err(e) => {
            tracing::debug!(error = %e, "failed to buffer request body");
            let response = StatusCode::BAD_REQUEST.into_response();
            return finish(&state, &ctx, start, response, None, None);
        }
    };

    let response = next.run(Request::from_parts(parts, req_body)).await;

    if ctx.principal.is_none() {
        ctx.principal = response.extensions().get::<Principal>().map(|p| p.0.clone());
    }

    // ── Response body ───────────────────────────────────────────
    let (res_parts, body) = response.into_parts();
    let (response, res_text) = match capture(body).await {
        Ok((body, text)) => (Response::from_parts(res_parts, body), text),
        Err(e) => {
            tracing::debug!(error = %e, "failed to buffer response body");
            (StatusCode::INTERNAL_SERVER_ERROR.into_response(), None)
        }
    };

    finish(&state, &ctx, start, response, req_text.as_deref(), res_text.as_deref())
}

fn finish(
    state: &AppState,
    ctx: &RequestContext,
    start: Instant,
    mut response: Response,
    req_text: Option<&str>,
    res_text: Option<&str>,
) -> Response {
    let elapsed = start.elapsed();
    let latency_ms = elapsed.as_millis() as u64;
    let status = response.status().as_u16();

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    state
        .telemetry
        .record_http_request(&ctx.method, status, latency_ms);
    state
        .telemetry
        .log_http(ctx, &ResponseContext { status }, req_text, res_text);

    tracing::debug!(
        status,
        method = %ctx.method,
        path = %ctx.path,
        latency_ms,
        "request completed"
    );

    response
}

/// Buffer a body if it is known to be small, returning it re-wrapped along
/// with its text. Unbounded or large bodies pass through untouched.
async fn capture(body: Body) -> Result<(Body, Option<String>), axum::Error> {
    let small = body
        .size_hint()
        .upper()
        .is_some_and(|n| n <= MAX_CAPTURED_BODY as u64);
    if !small {
        return Ok((body, None));
    }

    let bytes: Bytes = axum::body::to_bytes(body, MAX_CAPTURED_BODY).await?;
    let text = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());
    Ok((Body::from(bytes), text))
}
