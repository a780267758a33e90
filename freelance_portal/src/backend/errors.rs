//! Backend error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised at the remote backend boundary
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request did not settle within its budget
    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status with the backend's message
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Email/password pair rejected by the auth provider
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Account exists but the email address has not been confirmed
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    /// Missing or rejected access token
    #[error("Unauthorized")]
    Unauthorized,

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Network monitor reports no connectivity
    #[error("Network unavailable")]
    Offline,

    /// Request was abandoned by its caller
    #[error("Request cancelled")]
    Cancelled,
}

impl BackendError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BackendError::Timeout(_) | BackendError::Offline => true,
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the failure came from the transport rather than the backend
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            BackendError::Http(_) | BackendError::Timeout(_) | BackendError::Offline
        )
    }

    /// Get a client-safe error message that doesn't leak transport details
    pub fn client_message(&self) -> String {
        match self {
            BackendError::Http(_) | BackendError::Offline => {
                "Network error. Check your connection and try again.".to_string()
            }
            BackendError::Timeout(_) => "The server is taking too long to respond.".to_string(),
            BackendError::Status { .. } | BackendError::Decode(_) => {
                "Something went wrong on our side. Please try again.".to_string()
            }
            BackendError::NotFound { entity, .. } => format!("{entity} not found"),
            _ => self.to_string(),
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
