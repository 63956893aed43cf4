//! Network seam used by the engine. Implemented over HTTP by `fieldkit-remote`.

use async_trait::async_trait;
use thiserror::Error;

use super::action_model::ActionPayload;
use super::retry_policy::{classify_http_status, SyncRetryClass};

/// Any HTTP response, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Option<serde_json::Value>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn retry_class(&self) -> SyncRetryClass {
        classify_http_status(self.status)
    }
}

/// The request produced no HTTP response at all.
///
/// Timeouts and connection failures are treated exactly like being offline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The payload could not be turned into a request (bad URL, etc.).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Issue the request described by `payload` once.
    ///
    /// Returns `Ok` for every HTTP response, including non-2xx. `Err` means no
    /// response was received.
    async fn send(
        &self,
        payload: &ActionPayload,
    ) -> std::result::Result<RemoteResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_only_2xx() {
        assert!(RemoteResponse::new(200, None).is_success());
        assert!(RemoteResponse::new(204, None).is_success());
        assert!(!RemoteResponse::new(304, None).is_success());
        assert!(!RemoteResponse::new(500, None).is_success());
    }
}
