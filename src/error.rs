//! Error types for outbound telemetry delivery.
//!
//! None of these ever reach request-serving code: exporter and shipper catch
//! them, report through `tracing` and count them in [`DeliveryStats`].
//!
//! [`DeliveryStats`]: crate::telemetry::DeliveryStats

use thiserror::Error;

/// Failure to deliver one metrics payload or one log push.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected payload: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ExportError {
    /// Build a `Status` error, keeping only the head of the response body.
    pub(crate) fn status(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(200).collect(),
        }
    }
}
