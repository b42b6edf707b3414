//! Loki push of individual log records.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::record::LogRecord;
use super::redact::redact_fields;
use crate::config::LoggingConfig;
use crate::error::ExportError;
use crate::telemetry::{now_unix_millis, SinkStats};

/// `POST /loki/api/v1/push` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    pub streams: Vec<LogStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogStream {
    pub stream: StreamLabels,
    /// `[timestamp_ns, line]` pairs.
    pub values: Vec<[String; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamLabels {
    pub component: String,
    pub level: String,
    #[serde(rename = "type")]
    pub category: String,
}

/// Ships records to the log-aggregation endpoint. Cheap to clone.
#[derive(Clone)]
pub struct LogShipper {
    inner: Arc<ShipperInner>,
}

struct ShipperInner {
    config: LoggingConfig,
    client: reqwest::Client,
    stats: Arc<SinkStats>,
}

impl LogShipper {
    pub fn new(config: LoggingConfig, stats: Arc<SinkStats>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "log client build failed, using defaults");
                reqwest::Client::new()
            });

        Self {
            inner: Arc::new(ShipperInner {
                config,
                client,
                stats,
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.config.url.is_some()
    }

    /// Redact and wrap one record, stamped with the current time.
    pub fn push_request(&self, record: &LogRecord) -> Result<PushRequest, ExportError> {
        let mut fields = record.fields.clone();
        redact_fields(&mut fields);
        let line = serde_json::to_string(&Value::Object(fields))?;
        let timestamp_ns = now_unix_millis().saturating_mul(1_000_000);

        Ok(PushRequest {
            streams: vec![LogStream {
                stream: StreamLabels {
                    component: self.inner.config.source.clone(),
                    level: record.level.as_str().to_owned(),
                    category: record.category.as_str().to_owned(),
                },
                values: vec![[timestamp_ns.to_string(), line]],
            }],
        })
    }

    /// Ship and report the outcome. `Ok(false)` means nothing is configured.
    pub async fn try_ship(&self, record: &LogRecord) -> Result<bool, ExportError> {
        let Some(url) = self.inner.config.url.as_deref() else {
            return Ok(false);
        };
        let result = self.post(url, record).await;
        match &result {
            Ok(()) => self.inner.stats.record_sent(),
            Err(_) => self.inner.stats.record_failed(),
        }
        result.map(|()| true)
    }

    /// Ship, swallowing every failure into the local diagnostics.
    pub async fn ship(&self, record: &LogRecord) {
        match self.try_ship(record).await {
            Ok(true) => {}
            Ok(false) => tracing::trace!("logging URL not configured, skipping log send"),
            Err(e) => tracing::warn!(
                error = %e,
                category = record.category.as_str(),
                "failed to ship log record"
            ),
        }
    }

    /// Ship on a detached task. Returns `None` when there is nothing to do
    /// or no runtime to run on.
    pub fn ship_detached(&self, record: LogRecord) -> Option<JoinHandle<()>> {
        if !self.is_configured() {
            return None;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no tokio runtime, dropping log record");
                return None;
            }
        };
        let shipper = self.clone();
        Some(handle.spawn(async move { shipper.ship(&record).await }))
    }

    async fn post(&self, url: &str, record: &LogRecord) -> Result<(), ExportError> {
        let body = serde_json::to_vec(&self.push_request(record)?)?;
        let auth = format!("{}:{}", self.inner.config.user_id, self.inner.config.api_key);
        let resp = self
            .inner
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(auth)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ExportError::status(status, &text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::record::{build_db_log, LogCategory, LogLevel};
    use serde_json::json;

    fn shipper(url: Option<&str>) -> LogShipper {
        LogShipper::new(
            LoggingConfig {
                url: url.map(str::to_owned),
                source: "pizza-svc".into(),
                ..LoggingConfig::default()
            },
            Arc::new(SinkStats::default()),
        )
    }

    #[test]
    fn envelope_matches_loki_push_shape() {
        let record = build_db_log("SELECT 1", &[1]);
        let req = shipper(None).push_request(&record).unwrap();
        let v = serde_json::to_value(&req).unwrap();

        assert_eq!(
            v["streams"][0]["stream"],
            json!({"component": "pizza-svc", "level": "info", "type": "db"})
        );
        let pair = v["streams"][0]["values"][0].as_array().unwrap();
        assert_eq!(pair.len(), 2);
        let ts = pair[0].as_str().unwrap();
        assert!(ts.ends_with("000000"));
        assert!(ts.parse::<u128>().is_ok());
        assert_eq!(pair[1], r#"{"req":"SELECT 1 [1]"}"#);
    }

    #[test]
    fn pushed_line_never_contains_password() {
        let mut fields = serde_json::Map::new();
        fields.insert("reqBody".into(), json!(r#"{"email":"a@jwt.com","password":"secret123"}"#));
        let record = LogRecord {
            level: LogLevel::Info,
            category: LogCategory::Http,
            fields,
        };
        let body = serde_json::to_string(&shipper(None).push_request(&record).unwrap()).unwrap();
        assert!(!body.contains("secret123"));
        assert!(body.contains("*****"));
    }

    #[tokio::test]
    async fn unconfigured_shipper_is_a_noop() {
        let s = shipper(None);
        let record = build_db_log("SELECT 1", &[0u8; 0]);
        assert!(!s.try_ship(&record).await.unwrap());
        assert!(s.ship_detached(record).is_none());
        assert_eq!(s.inner.stats.counts().failed, 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let s = shipper(Some("http://127.0.0.1:9/loki/api/v1/push"));
        let record = build_db_log("SELECT 1", &[0u8; 0]);
        s.ship(&record).await;
        assert_eq!(s.inner.stats.counts().failed, 1);
    }
}
