//! Workspace error types.

use super::validation::ValidationErrors;
use crate::auth::Permission;
use crate::backend::BackendError;
use thiserror::Error;

/// Workspace errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Form failed local validation; nothing was sent
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Remote write or read failed; optimistic changes were reverted
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Record is not in the local store
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller lacks the permission the operation needs
    #[error("Missing permission: {0}")]
    PermissionDenied(Permission),
}

impl WorkspaceError {
    /// Get a client-safe message suitable for a transient toast
    pub fn client_message(&self) -> String {
        match self {
            WorkspaceError::Validation(_) => "Please fix the highlighted fields.".to_string(),
            WorkspaceError::Backend(BackendError::Unauthorized) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            WorkspaceError::Backend(e) => format!(
                "{} Your changes were not saved.",
                e.client_message()
            ),
            WorkspaceError::NotFound { entity, .. } => format!("{entity} not found."),
            WorkspaceError::PermissionDenied(_) => {
                "You do not have permission to do that.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkspaceError::Backend(e) if e.is_retryable())
    }
}

impl From<ValidationErrors> for WorkspaceError {
    fn from(errors: ValidationErrors) -> Self {
        WorkspaceError::Validation(errors)
    }
}

/// Result type for workspace operations
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
