//! Periodic push of registry snapshots to an OTLP/HTTP collector.
//!
//! Each tick captures the registry plus one system sample, flattens and
//! encodes it, and hands the POST to a detached task. At most one POST is in
//! flight: a tick that finds the previous one still outstanding is dropped.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::flatten::{flatten, MetricDomain, MetricPoint};
use super::otlp::{encode, ExportMetricsRequest};
use super::registry::MetricRegistry;
use super::system::SystemSampler;
use crate::config::MetricsConfig;
use crate::error::ExportError;
use crate::telemetry::{now_unix_nanos, SinkStats};

/// Shortest export period; `tokio::time::interval` rejects zero.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Credentials derived from the configured API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportAuth {
    /// `instanceId:token` keys (Grafana Cloud OTLP style).
    Basic { instance_id: String, token: String },
    Bearer(String),
}

impl ExportAuth {
    pub fn from_api_key(api_key: &str) -> Self {
        let mut parts = api_key.split(':');
        let instance_id = parts.next().unwrap_or_default();
        match parts.next().filter(|t| !t.is_empty()) {
            Some(token) => Self::Basic {
                instance_id: instance_id.to_owned(),
                token: token.to_owned(),
            },
            None => Self::Bearer(api_key.to_owned()),
        }
    }

    fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Basic { instance_id, token } => req.basic_auth(instance_id, Some(token)),
            Self::Bearer(key) => req.bearer_auth(key),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A transmission of this many points was started.
    Dispatched(usize),
    /// The previous transmission was still outstanding.
    Skipped,
    /// No export URL is configured.
    NotConfigured,
}

pub struct MetricsExporter {
    config: MetricsConfig,
    auth: ExportAuth,
    client: reqwest::Client,
    registry: Arc<MetricRegistry>,
    sampler: Arc<SystemSampler>,
    in_flight: Arc<Semaphore>,
    stats: Arc<SinkStats>,
}

impl MetricsExporter {
    pub fn new(
        config: MetricsConfig,
        registry: Arc<MetricRegistry>,
        sampler: Arc<SystemSampler>,
        stats: Arc<SinkStats>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "metrics client build failed, using defaults");
                reqwest::Client::new()
            });

        Self {
            auth: ExportAuth::from_api_key(&config.api_key),
            config,
            client,
            registry,
            sampler,
            in_flight: Arc::new(Semaphore::new(1)),
            stats,
        }
    }

    /// The sampler whose CPU window spans export ticks.
    pub fn sampler(&self) -> &Arc<SystemSampler> {
        &self.sampler
    }

    /// Snapshot every domain (plus one system sample) and flatten it.
    pub fn capture(&self) -> Vec<MetricPoint> {
        let snap = self.registry.snapshot();
        let system = self.sampler.sample();

        tracing::debug!(
            logins = snap.auth.total_logins,
            logouts = snap.auth.total_logouts,
            active = snap.user.active_users,
            "metrics snapshot"
        );

        flatten(&[
            MetricDomain::from_serialize("http", &snap.http),
            MetricDomain::from_serialize("system", &system),
            MetricDomain::from_serialize("user", &snap.user),
            MetricDomain::from_serialize("purchase", &snap.purchase),
            MetricDomain::from_serialize("auth", &snap.auth),
        ])
    }

    /// Capture and encode one export cycle.
    pub fn build_payload(&self) -> (usize, ExportMetricsRequest) {
        let points = self.capture();
        let payload = encode(&points, &self.config.source, now_unix_nanos());
        (points.len(), payload)
    }

    /// Run one cycle and wait for the collector's answer.
    pub async fn export_once(&self) -> Result<TickOutcome, ExportError> {
        let Some(url) = self.config.url.as_deref() else {
            tracing::debug!("metrics URL not configured, skipping export");
            return Ok(TickOutcome::NotConfigured);
        };
        let (count, payload) = self.build_payload();
        self.transmit(url, &payload).await?;
        Ok(TickOutcome::Dispatched(count))
    }

    /// One scheduled tick. Returns as soon as the transmission is handed off.
    pub fn tick(self: &Arc<Self>) -> TickOutcome {
        let Some(url) = self.config.url.clone() else {
            tracing::debug!("metrics URL not configured, skipping export");
            return TickOutcome::NotConfigured;
        };

        let permit = match self.in_flight.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.record_skipped();
                tracing::debug!("previous metrics export still in flight, skipping tick");
                return TickOutcome::Skipped;
            }
        };

        let (count, payload) = self.build_payload();
        let exporter = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            match exporter.transmit(&url, &payload).await {
                Ok(()) => tracing::info!(metrics = count, "sent metrics"),
                Err(e) => tracing::warn!(error = %e, "failed to send metrics"),
            }
        });
        TickOutcome::Dispatched(count)
    }

    /// Fire once now, then every `period` until the handle is stopped.
    /// A zero `period` is raised to [`MIN_PERIOD`].
    pub fn start(self: Arc<Self>, period: Duration) -> ExporterHandle {
        let period = if period < MIN_PERIOD {
            tracing::warn!(
                period_ms = period.as_millis() as u64,
                "export period below minimum, using 1 ms"
            );
            MIN_PERIOD
        } else {
            period
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tracing::info!(period_ms = period.as_millis() as u64, "starting metrics export");

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick();
                    }
                }
            }
            tracing::debug!("metrics export loop stopped");
        });

        ExporterHandle { cancel, task }
    }

    async fn transmit(&self, url: &str, payload: &ExportMetricsRequest) -> Result<(), ExportError> {
        let result = self.post(url, payload).await;
        match &result {
            Ok(()) => self.stats.record_sent(),
            Err(_) => self.stats.record_failed(),
        }
        result
    }

    async fn post(&self, url: &str, payload: &ExportMetricsRequest) -> Result<(), ExportError> {
        let body = serde_json::to_vec(payload)?;
        let req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let resp = self.auth.apply(req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ExportError::status(status, &text));
        }
        Ok(())
    }
}

/// Owns the export loop. Dropping it leaves the loop running.
pub struct ExporterHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ExporterHandle {
    /// Cancel future ticks and wait for the loop to exit. A transmission
    /// already handed off is left to finish on its own.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_key_selects_basic_auth() {
        assert_eq!(
            ExportAuth::from_api_key("123456:glc_abc"),
            ExportAuth::Basic {
                instance_id: "123456".into(),
                token: "glc_abc".into()
            }
        );
    }

    #[test]
    fn plain_key_selects_bearer() {
        assert_eq!(
            ExportAuth::from_api_key("glc_abc"),
            ExportAuth::Bearer("glc_abc".into())
        );
        // trailing colon leaves no token
        assert_eq!(
            ExportAuth::from_api_key("123456:"),
            ExportAuth::Bearer("123456:".into())
        );
        assert_eq!(ExportAuth::from_api_key(""), ExportAuth::Bearer(String::new()));
    }

    fn exporter(url: Option<&str>) -> Arc<MetricsExporter> {
        let config = MetricsConfig {
            url: url.map(str::to_owned),
            ..MetricsConfig::default()
        };
        Arc::new(MetricsExporter::new(
            config,
            Arc::new(MetricRegistry::new()),
            Arc::new(SystemSampler::new()),
            Arc::new(SinkStats::default()),
        ))
    }

    #[test]
    fn capture_covers_every_domain() {
        let exp = exporter(None);
        exp.registry.record_http_request("GET", 200, 5);
        let points = exp.capture();
        for prefix in ["http.", "system.", "user.", "purchase.", "auth."] {
            assert!(
                points.iter().any(|p| p.name.starts_with(prefix)),
                "missing {prefix}"
            );
        }
        assert!(points
            .iter()
            .any(|p| p.name == "http.requestsByMethod" && p.labels["method"] == "GET"));
    }

    #[tokio::test]
    async fn unconfigured_export_is_a_silent_noop() {
        let exp = exporter(None);
        assert_eq!(exp.tick(), TickOutcome::NotConfigured);
        assert_eq!(exp.export_once().await.unwrap(), TickOutcome::NotConfigured);
        let counts = exp.stats.counts();
        assert_eq!(counts.sent + counts.failed + counts.skipped, 0);
    }

    #[tokio::test]
    async fn zero_period_keeps_the_loop_alive() {
        let exp = exporter(None);
        let handle = exp.start(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn tick_is_skipped_while_permit_is_held() {
        let exp = exporter(Some("http://127.0.0.1:9/otlp"));
        let _held = exp.in_flight.clone().try_acquire_owned().unwrap();
        assert_eq!(exp.tick(), TickOutcome::Skipped);
        assert_eq!(exp.stats.counts().skipped, 1);
    }
}
