//! Error kinds shared by the server store and the agent.
//!
//! Callers match on the variant, never on the message text.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, MetricsError>;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("metric not found: {id}")]
    NotFound { id: String },

    #[error("metric type is not implemented: {kind}")]
    NotImplemented { kind: String },

    #[error("signature mismatch for metric {id}")]
    InvalidSignature { id: String },

    /// Kind and payload disagree (a counter without `delta`, a gauge without `value`).
    #[error("malformed metric {id}: {reason}")]
    MalformedMetric { id: String, reason: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MetricsError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }
}

impl From<sqlx::Error> for MetricsError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
