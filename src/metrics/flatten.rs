//! Flattening of nested domain snapshots into named, labelled points.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Fields whose inner keys become a label rather than a name segment.
const LABELED_FIELDS: &[(&str, &str)] = &[
    ("requestsByMethod", "method"),
    ("requestsByStatus", "status"),
];

/// A numeric observation, tagged by whether it is mathematically integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    /// Integral finite values become `Int`, everything else `Float`.
    pub fn from_f64(v: f64) -> Self {
        if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            Self::Int(v as i64)
        } else if v.is_finite() {
            Self::Float(v)
        } else {
            Self::Int(0)
        }
    }

    fn from_number(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            Self::Int(i)
        } else if let Some(u) = n.as_u64() {
            Self::Int(i64::try_from(u).unwrap_or(i64::MAX))
        } else {
            Self::from_f64(n.as_f64().unwrap_or(0.0))
        }
    }

    /// Strings are parsed as numbers; unparseable text reads as zero.
    fn from_text(s: &str) -> Self {
        Self::from_f64(s.trim().parse::<f64>().unwrap_or(0.0))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

/// One flattened observation, e.g. `http.requestsByMethod{method="GET"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub value: MetricValue,
    pub labels: BTreeMap<String, String>,
}

/// A named group of fields, read from one registry domain snapshot.
#[derive(Debug, Clone)]
pub struct MetricDomain {
    pub prefix: String,
    pub fields: Map<String, Value>,
}

impl MetricDomain {
    pub fn new(prefix: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            prefix: prefix.into(),
            fields,
        }
    }

    /// Capture a serializable domain struct. Non-object values (or a
    /// serialization failure) yield an empty domain.
    pub fn from_serialize<T: Serialize>(prefix: &str, domain: &T) -> Self {
        let fields = match serde_json::to_value(domain) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                tracing::warn!(prefix, error = %e, "failed to capture metric domain");
                Map::new()
            }
        };
        Self::new(prefix, fields)
    }
}

/// Flatten every domain in order into a single point list.
pub fn flatten(domains: &[MetricDomain]) -> Vec<MetricPoint> {
    let mut points = Vec::new();
    for domain in domains {
        flatten_map(&domain.fields, &domain.prefix, &mut points);
    }
    points
}

fn flatten_map(fields: &Map<String, Value>, prefix: &str, out: &mut Vec<MetricPoint>) {
    for (key, value) in fields {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::Number(n) => out.push(MetricPoint {
                name,
                value: MetricValue::from_number(n),
                labels: BTreeMap::new(),
            }),
            Value::String(s) => out.push(MetricPoint {
                name,
                value: MetricValue::from_text(s),
                labels: BTreeMap::new(),
            }),
            Value::Object(inner) => match label_for(key) {
                Some(label) => flatten_labeled(inner, &name, label, out),
                None => flatten_map(inner, &name, out),
            },
            // Booleans, nulls and arrays carry no metric.
            _ => {}
        }
    }
}

fn flatten_labeled(inner: &Map<String, Value>, name: &str, label: &str, out: &mut Vec<MetricPoint>) {
    for (key, value) in inner {
        let value = match value {
            Value::Number(n) => MetricValue::from_number(n),
            Value::String(s) => MetricValue::from_text(s),
            _ => continue,
        };
        out.push(MetricPoint {
            name: name.to_owned(),
            value,
            labels: BTreeMap::from([(label.to_owned(), key.clone())]),
        });
    }
}

fn label_for(field: &str) -> Option<&'static str> {
    LABELED_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, label)| *label)
}
