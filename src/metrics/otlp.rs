//! OTLP/HTTP JSON envelope for exported metric points.

use serde::Serialize;

use super::flatten::{MetricPoint, MetricValue};

/// Name fragments that mark a metric as a monotonic counter.
const COUNTER_MARKERS: &[&str] = &["total", "Requests", "Purchases", "Logins", "Updates"];

/// `AGGREGATION_TEMPORALITY_CUMULATIVE`
const CUMULATIVE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Counter/gauge classification by name alone (case-sensitive).
pub fn classify(name: &str) -> MetricKind {
    if COUNTER_MARKERS.iter().any(|m| name.contains(m)) {
        MetricKind::Counter
    } else {
        MetricKind::Gauge
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeMetrics {
    pub scope: Scope,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scope {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Sum(Sum),
    Gauge(Gauge),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: u8,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    pub attributes: Vec<KeyValue>,
    pub time_unix_nano: String,
    #[serde(flatten)]
    pub value: PointValue,
}

/// `asInt` is a decimal string per the OTLP JSON mapping, `asDouble` a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PointValue {
    #[serde(rename = "asInt")]
    AsInt(String),
    #[serde(rename = "asDouble")]
    AsDouble(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: AnyValue {
                string_value: value.into(),
            },
        }
    }
}

/// Encode one export cycle. Every point shares `time_unix_nano`.
pub fn encode(points: &[MetricPoint], service_name: &str, time_unix_nano: u64) -> ExportMetricsRequest {
    let timestamp = time_unix_nano.to_string();
    let metrics = points
        .iter()
        .map(|point| encode_point(point, &timestamp))
        .collect();

    ExportMetricsRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Resource {
                attributes: vec![KeyValue::string("service.name", service_name)],
            },
            scope_metrics: vec![ScopeMetrics {
                scope: Scope::default(),
                metrics,
            }],
        }],
    }
}

fn encode_point(point: &MetricPoint, timestamp: &str) -> Metric {
    let data_point = NumberDataPoint {
        attributes: point
            .labels
            .iter()
            .map(|(k, v)| KeyValue::string(k.as_str(), v.as_str()))
            .collect(),
        time_unix_nano: timestamp.to_owned(),
        value: match point.value {
            MetricValue::Int(i) => PointValue::AsInt(i.to_string()),
            MetricValue::Float(f) => PointValue::AsDouble(f),
        },
    };

    let data = match classify(&point.name) {
        MetricKind::Counter => MetricData::Sum(Sum {
            data_points: vec![data_point],
            aggregation_temporality: CUMULATIVE,
            is_monotonic: true,
        }),
        MetricKind::Gauge => MetricData::Gauge(Gauge {
            data_points: vec![data_point],
        }),
    };

    Metric {
        name: point.name.clone(),
        description: format!("{} metric", point.name),
        unit: String::new(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn point(name: &str, value: MetricValue) -> MetricPoint {
        MetricPoint {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn classification_follows_name_markers() {
        assert_eq!(classify("http.totalRequests"), MetricKind::Counter);
        assert_eq!(classify("purchase.successfulPurchases"), MetricKind::Counter);
        assert_eq!(classify("auth.failedLogins"), MetricKind::Counter);
        assert_eq!(classify("user.totalUserUpdates"), MetricKind::Counter);
        assert_eq!(classify("user.activeUsers"), MetricKind::Gauge);
        assert_eq!(classify("system.cpuUsage"), MetricKind::Gauge);
        // lowercase "requests" is not a marker
        assert_eq!(classify("http.requestsByMethod"), MetricKind::Gauge);
    }

    #[test]
    fn counter_is_encoded_as_cumulative_sum() {
        let req = encode(&[point("auth.totalLogins", MetricValue::Int(4))], "svc", 1_000);
        let v = serde_json::to_value(&req).unwrap();
        let metric = &v["resourceMetrics"][0]["scopeMetrics"][0]["metrics"][0];
        assert_eq!(
            metric,
            &json!({
                "name": "auth.totalLogins",
                "description": "auth.totalLogins metric",
                "unit": "",
                "sum": {
                    "dataPoints": [{"attributes": [], "timeUnixNano": "1000", "asInt": "4"}],
                    "aggregationTemporality": 2,
                    "isMonotonic": true
                }
            })
        );
    }

    #[test]
    fn gauge_with_float_and_labels() {
        let mut p = point("http.requestsByMethod", MetricValue::Int(2));
        p.labels.insert("method".into(), "GET".into());
        let req = encode(
            &[p, point("system.cpuUsage", MetricValue::Float(12.5))],
            "svc",
            7,
        );
        let v = serde_json::to_value(&req).unwrap();
        let metrics = v["resourceMetrics"][0]["scopeMetrics"][0]["metrics"]
            .as_array()
            .unwrap();

        let by_method = &metrics[0]["gauge"]["dataPoints"][0];
        assert_eq!(by_method["attributes"][0]["key"], "method");
        assert_eq!(by_method["attributes"][0]["value"]["stringValue"], "GET");
        assert_eq!(by_method["asInt"], "2");

        let cpu = &metrics[1]["gauge"]["dataPoints"][0];
        assert_eq!(cpu["asDouble"], json!(12.5));
        assert!(cpu.get("asInt").is_none());
        assert!(metrics[1].get("sum").is_none());
    }

    #[test]
    fn envelope_carries_service_name_and_empty_scope() {
        let v = serde_json::to_value(encode(&[], "jwt-pizza-service", 1)).unwrap();
        let rm = &v["resourceMetrics"][0];
        assert_eq!(rm["resource"]["attributes"][0]["key"], "service.name");
        assert_eq!(
            rm["resource"]["attributes"][0]["value"]["stringValue"],
            "jwt-pizza-service"
        );
        assert_eq!(rm["scopeMetrics"][0]["scope"], json!({}));
        assert_eq!(rm["scopeMetrics"][0]["metrics"], Value::Array(vec![]));
    }

    #[test]
    fn encoding_is_stable_apart_from_timestamp() {
        let points = vec![
            point("purchase.totalPrice", MetricValue::Float(12.99)),
            point("user.activeUsers", MetricValue::Int(1)),
        ];
        let a = serde_json::to_string(&encode(&points, "svc", 111)).unwrap();
        let b = serde_json::to_string(&encode(&points, "svc", 222)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.replace("\"111\"", "\"T\""), b.replace("\"222\"", "\"T\""));
    }
}
