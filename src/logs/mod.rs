//! Structured, redacted log records shipped to the log-aggregation endpoint.

pub mod record;
pub mod redact;
pub mod shipper;

pub use record::{
    build_db_log, build_http_log, json_body_text, resolve_client_addr, LogCategory, LogLevel,
    LogRecord, RequestContext, ResponseContext,
};
pub use redact::{redact_fields, MASK};
pub use shipper::{LogShipper, PushRequest};
