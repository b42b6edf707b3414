//! Telemetry configuration loaded from environment variables.
//!
//! Invalid numeric values fall back to defaults without failing, and empty
//! strings are treated the same as unset variables.
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `METRICS_URL` / `GRAFANA_URL` | unset | OTLP metrics endpoint |
//! | `METRICS_API_KEY` | empty | `instanceId:token` or raw bearer key |
//! | `METRICS_SOURCE` | `jwt-pizza-service` | `service.name` attribute |
//! | `METRICS_PERIOD_MS` | 30000 | Export period |
//! | `METRICS_TIMEOUT_MS` | 10000 | Per-export HTTP timeout |
//! | `LOGGING_URL` | unset | Loki push endpoint |
//! | `LOGGING_USER_ID` | empty | Loki user id |
//! | `LOGGING_API_KEY` | empty | Loki api key |
//! | `LOGGING_SOURCE` | `jwt-pizza-service` | `component` stream label |
//! | `LOGGING_TIMEOUT_MS` | 5000 | Per-push HTTP timeout |

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_SOURCE: &str = "jwt-pizza-service";

const DEFAULT_PERIOD_MS: u64 = 30_000;
const DEFAULT_METRICS_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOGGING_TIMEOUT_MS: u64 = 5_000;

/// Both export paths, each independently optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how often registry snapshots are pushed.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Export endpoint. `None` turns every export tick into a no-op.
    #[serde(default)]
    pub url: Option<String>,
    /// `instanceId:token` selects Basic auth, anything else is sent as Bearer.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_metrics_timeout_ms")]
    pub timeout_ms: u64,
}

/// Where shipped log records go.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_logging_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}
fn default_period_ms() -> u64 {
    DEFAULT_PERIOD_MS
}
fn default_metrics_timeout_ms() -> u64 {
    DEFAULT_METRICS_TIMEOUT_MS
}
fn default_logging_timeout_ms() -> u64 {
    DEFAULT_LOGGING_TIMEOUT_MS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: String::new(),
            source: default_source(),
            period_ms: DEFAULT_PERIOD_MS,
            timeout_ms: DEFAULT_METRICS_TIMEOUT_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            url: None,
            user_id: String::new(),
            api_key: String::new(),
            source: default_source(),
            timeout_ms: DEFAULT_LOGGING_TIMEOUT_MS,
        }
    }
}

impl MetricsConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LoggingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TelemetryConfig {
    /// Read every setting from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests don't touch process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_u64 = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let metrics = MetricsConfig {
            url: get("METRICS_URL").or_else(|| get("GRAFANA_URL")),
            api_key: get("METRICS_API_KEY").unwrap_or_default(),
            source: get("METRICS_SOURCE").unwrap_or_else(default_source),
            period_ms: get_u64("METRICS_PERIOD_MS", DEFAULT_PERIOD_MS),
            timeout_ms: get_u64("METRICS_TIMEOUT_MS", DEFAULT_METRICS_TIMEOUT_MS),
        };

        let logging = LoggingConfig {
            url: get("LOGGING_URL"),
            user_id: get("LOGGING_USER_ID").unwrap_or_default(),
            api_key: get("LOGGING_API_KEY").unwrap_or_default(),
            source: get("LOGGING_SOURCE").unwrap_or_else(default_source),
            timeout_ms: get_u64("LOGGING_TIMEOUT_MS", DEFAULT_LOGGING_TIMEOUT_MS),
        };

        Self { metrics, logging }
    }
}
