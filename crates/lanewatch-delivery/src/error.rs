//! Delivery error types.

use thiserror::Error;

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Ingestion endpoint returned {0}: {1}")]
    Rejected(u16, String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid fallback record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected(status, body.into())
    }

    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the failure happened talking to the remote service, as
    /// opposed to a local problem.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DeliveryError::Rejected(..) | DeliveryError::Timeout(_) | DeliveryError::Network(_)
        )
    }

    /// HTTP status for rejected deliveries.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            DeliveryError::Rejected(status, _) => Some(*status),
            _ => None,
        }
    }
}
