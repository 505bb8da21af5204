//! Error types for Herald
//!
//! One enum for the whole crate. Fan-out pushes report partial failure
//! through [`PushFailure`] rather than the first error encountered.

use hyper::StatusCode;
use std::fmt;

/// Main error type for Herald operations
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Stream provisioning failed: {0}")]
    Provisioning(String),

    /// Signalled by a bus when the stream is already present.
    /// Provisioning treats it as success.
    #[error("Stream already exists: {0}")]
    StreamExists(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Acknowledgment timed out: {0}")]
    AckTimeout(String),

    #[error("Push partially failed: {0}")]
    PartialPush(PushFailure),

    #[error("Presence error: {0}")]
    Presence(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Codec(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Nats(_) | Self::Presence(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Publish(_) | Self::PartialPush(_) | Self::Rpc(_) => StatusCode::BAD_GATEWAY,
            Self::AckTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Provisioning(_)
            | Self::StreamExists(_)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error came from the acknowledgment deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout(_))
    }
}

/// Per-server outcome of a fan-out push that did not fully succeed
#[derive(Debug, Default, serde::Serialize)]
pub struct PushFailure {
    /// Servers whose publish was acknowledged
    pub delivered: Vec<String>,
    /// Servers whose publish failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for PushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} server(s) failed",
            self.failed.len(),
            self.failed.len() + self.delivered.len()
        )?;
        for (server, reason) in &self.failed {
            write!(f, "; {server}: {reason}")?;
        }
        Ok(())
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for HeraldError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for HeraldError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(format!("JSON error: {}", err))
    }
}

impl From<rmp_serde::encode::Error> for HeraldError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(format!("MessagePack encode error: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for HeraldError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(format!("MessagePack decode error: {}", err))
    }
}

impl From<hyper::Error> for HeraldError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<async_nats::Error> for HeraldError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

/// Result type alias for Herald operations
pub type Result<T> = std::result::Result<T, HeraldError>;
