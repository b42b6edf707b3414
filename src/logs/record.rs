//! Structured log records for HTTP requests and database queries.

use std::fmt::{self, Display};
use std::sync::LazyLock;

use axum::http::HeaderMap;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

static IPV4_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("valid IPv4 regex"));

const UNKNOWN_ADDR: &str = "unknown";
const EMPTY_BODY: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Http,
    Db,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
        }
    }
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Db => "db",
        }
    }
}

/// One event to ship. Built per request or query, never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub category: LogCategory,
    pub fields: Map<String, Value>,
}

/// What the log builder needs to know about an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    /// Peer address of the underlying connection, if known.
    pub remote_addr: Option<String>,
    /// Resolved principal, set by whatever authenticated the request.
    pub principal: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseContext {
    pub status: u16,
}

/// Build the record for one completed HTTP exchange. Absent or empty bodies
/// are logged as `{}`.
pub fn build_http_log(
    req: &RequestContext,
    res: &ResponseContext,
    req_body: Option<&str>,
    res_body: Option<&str>,
) -> LogRecord {
    let mut fields = Map::new();
    fields.insert("authorized".into(), Value::Bool(req.principal.is_some()));
    fields.insert("path".into(), Value::String(req.path.clone()));
    fields.insert("method".into(), Value::String(req.method.clone()));
    fields.insert("statusCode".into(), Value::from(res.status));
    fields.insert("reqBody".into(), Value::String(body_text(req_body)));
    fields.insert("resBody".into(), Value::String(body_text(res_body)));
    fields.insert(
        "ip".into(),
        Value::String(resolve_client_addr(&req.headers, req.remote_addr.as_deref())),
    );

    LogRecord {
        level: if res.status >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        },
        category: LogCategory::Http,
        fields,
    }
}

/// Build the record for one SQL statement: `"<sql> [p1, p2]"`.
pub fn build_db_log<P: Display>(sql: &str, params: &[P]) -> LogRecord {
    let text = if params.is_empty() {
        sql.to_owned()
    } else {
        format!("{sql} [{}]", JoinedParams(params))
    };

    let mut fields = Map::new();
    fields.insert("req".into(), Value::String(text));
    LogRecord {
        level: LogLevel::Info,
        category: LogCategory::Db,
        fields,
    }
}

struct JoinedParams<'a, P>(&'a [P]);

impl<P: Display> Display for JoinedParams<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// Coerce a JSON body value to text: strings verbatim, everything else
/// serialized.
pub fn json_body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Null => EMPTY_BODY.to_owned(),
        other => other.to_string(),
    }
}

fn body_text(body: Option<&str>) -> String {
    match body {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => EMPTY_BODY.to_owned(),
    }
}

/// Best-effort client address: `X-Forwarded-For` (first hop), then
/// `X-Real-IP`, then the connection peer. Dotted-quad IPv4 is rewritten to
/// its IPv4-mapped IPv6 form.
pub fn resolve_client_addr(headers: &HeaderMap, remote_addr: Option<&str>) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = header_str(headers, "x-real-ip")
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let remote = remote_addr.map(str::trim).filter(|v| !v.is_empty());

    match forwarded.or(real_ip).or(remote) {
        Some(addr) if IPV4_PATTERN.is_match(addr) => format!("::ffff:{addr}"),
        Some(addr) => addr.to_owned(),
        None => UNKNOWN_ADDR.to_owned(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
