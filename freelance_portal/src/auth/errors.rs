//! Authentication error types.

use super::state::AuthPhase;
use crate::backend::BackendError;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Local input check failed; no request was sent
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Email/password rejected
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Email address not confirmed yet
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    /// Backend or network failure
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// Operation needs a provider session and none is held
    #[error("No active session")]
    NoSession,

    /// Operation needs a signed-in user
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Requested phase change is not allowed
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: AuthPhase, to: AuthPhase },

    /// Profile enrichment failed and no fallback was allowed
    #[error("Profile enhancement failed: {0}")]
    EnhancementFailed(String),

    /// Continuing without a profile is switched off
    #[error("Basic access fallback is disabled")]
    FallbackDisabled,

    /// Attempt was superseded by sign-out, cancellation or a newer attempt
    #[error("Authentication attempt was superseded")]
    Superseded,
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidCredentials => AuthError::InvalidCredentials,
            BackendError::EmailNotConfirmed => AuthError::EmailNotConfirmed,
            other => AuthError::Backend(other),
        }
    }
}

impl AuthError {
    /// Whether the UI should offer a retry
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Backend(e) => e.is_retryable(),
            AuthError::EnhancementFailed(_) => true,
            _ => false,
        }
    }

    /// Get a client-safe, user-facing message
    ///
    /// Backend errors are sanitized so transport and schema details never
    /// reach the toast.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Validation(reason) => reason.clone(),
            AuthError::InvalidCredentials => {
                "The email or password you entered is incorrect.".to_string()
            }
            AuthError::EmailNotConfirmed => {
                "Please confirm your email address before signing in. Check your inbox for the confirmation link.".to_string()
            }
            AuthError::Backend(e) => e.client_message(),
            AuthError::NoSession | AuthError::NotAuthenticated => {
                "Your session has ended. Please sign in again.".to_string()
            }
            AuthError::EnhancementFailed(_) => {
                "We couldn't load your full profile. You can retry or continue with limited access.".to_string()
            }
            AuthError::FallbackDisabled => {
                "Limited access isn't available. Please retry loading your profile.".to_string()
            }
            AuthError::InvalidTransition { .. } | AuthError::Superseded => {
                "That action is no longer available.".to_string()
            }
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backend_credential_errors_are_lifted() {
        assert!(matches!(
            AuthError::from(BackendError::InvalidCredentials),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            AuthError::from(BackendError::EmailNotConfirmed),
            AuthError::EmailNotConfirmed
        ));
        assert!(matches!(
            AuthError::from(BackendError::Offline),
            AuthError::Backend(BackendError::Offline)
        ));
    }

    #[test]
    fn test_client_message_hides_backend_details() {
        let err = AuthError::from(BackendError::Status {
            status: 500,
            message: "permission denied for table profiles".to_string(),
        });
        assert!(!err.client_message().contains("profiles"));
    }

    #[test]
    fn test_retryable() {
        assert!(AuthError::from(BackendError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(!AuthError::InvalidCredentials.is_retryable());
        assert!(!AuthError::Validation("Email is required".to_string()).is_retryable());
    }
}
