//! Telemetry pipeline for the pizza service.
//!
//! Request-serving code records events into a [`MetricRegistry`]; a
//! background [`MetricsExporter`] periodically flattens the registry into
//! OTLP JSON and pushes it to a collector, while a [`LogShipper`] pushes
//! redacted access and query logs to Loki. Nothing here can fail or block the
//! request path.
//!
//! [`MetricRegistry`]: metrics::MetricRegistry
//! [`MetricsExporter`]: metrics::MetricsExporter
//! [`LogShipper`]: logs::LogShipper

pub mod config;
pub mod error;
pub mod logging;
pub mod logs;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod telemetry;

pub use config::TelemetryConfig;
pub use error::ExportError;
pub use telemetry::{DeliveryCounts, DeliveryStats, SinkCounts, SinkStats, Telemetry};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Recording API, exporter and shipper for this process.
    pub telemetry: Telemetry,
}

impl AppState {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}
