#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::Value;

/// One request received by the fake collector.
#[derive(Debug, Clone)]
pub struct Hit {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct Collector {
    hits: Arc<Mutex<Vec<Hit>>>,
    delay: Duration,
    status: StatusCode,
}

pub struct FakeCollector {
    pub url: String,
    pub hits: Arc<Mutex<Vec<Hit>>>,
}

impl FakeCollector {
    pub fn count(&self) -> usize {
        self.hits.lock().len()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().clone()
    }
}

/// Bind a throwaway collector on loopback that records every POST, waits
/// `delay`, then answers `status`.
pub async fn spawn_collector(delay: Duration, status: StatusCode) -> FakeCollector {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let collector = Collector {
        hits: hits.clone(),
        delay,
        status,
    };

    let app = Router::new()
        .route("/push", post(receive))
        .with_state(collector);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeCollector {
        url: format!("http://{addr}/push"),
        hits,
    }
}

async fn receive(
    State(c): State<Collector>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    c.hits.lock().push(Hit {
        authorization,
        body,
    });
    tokio::time::sleep(c.delay).await;
    c.status
}

/// Serve `app` on loopback with peer addresses available to middleware.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Poll `check` every 10 ms for up to 5 s.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Find the first OTLP metric named `name`.
pub fn find_metric<'a>(payload: &'a Value, name: &str) -> Option<&'a Value> {
    payload["resourceMetrics"][0]["scopeMetrics"][0]["metrics"]
        .as_array()?
        .iter()
        .find(|m| m["name"] == name)
}
