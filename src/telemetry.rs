//! The owned telemetry handle passed to request handlers and the exporter.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::TelemetryConfig;
use crate::logs::{build_db_log, build_http_log, LogShipper, RequestContext, ResponseContext};
use crate::metrics::{ExporterHandle, MetricRegistry, MetricsExporter, SystemSampler};

/// Outcome counters for one outbound sink.
#[derive(Debug, Default)]
pub struct SinkStats {
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkCounts {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl SinkStats {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> SinkCounts {
        SinkCounts {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Delivery outcomes kept apart per sink: metrics export and log shipping.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    metrics: Arc<SinkStats>,
    logs: Arc<SinkStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub metrics: SinkCounts,
    pub logs: SinkCounts,
}

impl DeliveryStats {
    pub fn metrics(&self) -> &Arc<SinkStats> {
        &self.metrics
    }

    pub fn logs(&self) -> &Arc<SinkStats> {
        &self.logs
    }

    pub fn counts(&self) -> DeliveryCounts {
        DeliveryCounts {
            metrics: self.metrics.counts(),
            logs: self.logs.counts(),
        }
    }
}

/// Registry, sampler, exporter and shipper, constructed once per process.
///
/// Recording calls only touch the registry and never block on I/O; log
/// shipping is handed to detached tasks. The exporter samples the host with
/// its own [`SystemSampler`], so polling the local views does not shorten
/// the CPU window it reports.
pub struct Telemetry {
    config: TelemetryConfig,
    registry: Arc<MetricRegistry>,
    sampler: Arc<SystemSampler>,
    exporter: Arc<MetricsExporter>,
    shipper: LogShipper,
    stats: Arc<DeliveryStats>,
}

impl Telemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        let registry = Arc::new(MetricRegistry::new());
        let sampler = Arc::new(SystemSampler::new());
        let stats = Arc::new(DeliveryStats::default());
        let exporter = Arc::new(MetricsExporter::new(
            config.metrics.clone(),
            registry.clone(),
            Arc::new(SystemSampler::new()),
            stats.metrics().clone(),
        ));
        let shipper = LogShipper::new(config.logging.clone(), stats.logs().clone());

        Self {
            config,
            registry,
            sampler,
            exporter,
            shipper,
            stats,
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Sampler backing the local metrics views.
    pub fn sampler(&self) -> &Arc<SystemSampler> {
        &self.sampler
    }

    pub fn exporter(&self) -> &Arc<MetricsExporter> {
        &self.exporter
    }

    pub fn shipper(&self) -> &LogShipper {
        &self.shipper
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Start periodic export at the configured period.
    pub fn start_export(&self) -> ExporterHandle {
        self.start_export_every(self.config.metrics.period())
    }

    pub fn start_export_every(&self, period: Duration) -> ExporterHandle {
        self.exporter.clone().start(period)
    }

    // ── Recording API ───────────────────────────────────────────

    pub fn record_http_request(&self, method: &str, status_code: u16, latency_ms: u64) {
        self.registry.record_http_request(method, status_code, latency_ms);
    }

    pub fn record_purchase(&self, success: bool, latency_ms: u64, price: f64, item_count: u64) {
        self.registry.record_purchase(success, latency_ms, price, item_count);
    }

    pub fn record_login(&self, success: bool) {
        self.registry.record_login(success);
    }

    pub fn record_logout(&self) {
        self.registry.record_logout();
    }

    pub fn record_registration(&self) {
        self.registry.record_registration();
    }

    pub fn record_user_update(&self) {
        self.registry.record_user_update();
    }

    /// Build and ship an HTTP access log, fire-and-forget.
    pub fn log_http(
        &self,
        req: &RequestContext,
        res: &ResponseContext,
        req_body: Option<&str>,
        res_body: Option<&str>,
    ) {
        if self.shipper.is_configured() {
            self.shipper
                .ship_detached(build_http_log(req, res, req_body, res_body));
        }
    }

    /// Build and ship a database query log, fire-and-forget.
    pub fn log_db<P: Display>(&self, sql: &str, params: &[P]) {
        if self.shipper.is_configured() {
            self.shipper.ship_detached(build_db_log(sql, params));
        }
    }
}

pub(crate) fn now_unix_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

pub(crate) fn now_unix_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or_else(|| now_unix_millis().saturating_mul(1_000_000))
}
