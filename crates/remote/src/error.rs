//! Error types for the remote crate.

use fieldkit_core::sync::{classify_http_status, SyncRetryClass, TransportError};
use thiserror::Error;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response from the contract API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or malformed access token
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) => SyncRetryClass::Permanent,
            Self::InvalidRequest(_) => SyncRetryClass::Permanent,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
        }
    }
}

impl From<RemoteError> for TransportError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Http(e) if e.is_timeout() => TransportError::Timeout(e.to_string()),
            RemoteError::Http(e) if e.is_builder() => TransportError::InvalidRequest(e.to_string()),
            RemoteError::Http(e) => TransportError::Unreachable(e.to_string()),
            // The server did answer, so this is never "unreachable". Callers
            // that want the status use `RemoteTransport::send`, which returns
            // every response as `Ok`.
            other @ (RemoteError::Api { .. }
            | RemoteError::Json(_)
            | RemoteError::InvalidRequest(_)
            | RemoteError::Auth(_)) => TransportError::InvalidRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = RemoteError::api(401, "unauthorized");
        assert_eq!(err.retry_class(), SyncRetryClass::ReauthRequired);
        assert_eq!(RemoteError::auth("no token").retry_class(), SyncRetryClass::ReauthRequired);
    }

    #[test]
    fn conflict_and_server_errors_are_retryable() {
        assert_eq!(RemoteError::api(409, "busy").retry_class(), SyncRetryClass::Retryable);
        assert_eq!(RemoteError::api(503, "down").retry_class(), SyncRetryClass::Retryable);
        assert_eq!(RemoteError::api(422, "bad block").retry_class(), SyncRetryClass::Permanent);
    }

    #[test]
    fn invalid_requests_convert_to_invalid_transport_error() {
        let err: TransportError = RemoteError::invalid_request("relative url").into();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn api_errors_never_look_like_a_lost_connection() {
        let err: TransportError = RemoteError::api(503, "down").into();
        assert_eq!(
            err,
            TransportError::InvalidRequest("API error (503): down".to_string())
        );
    }
}
