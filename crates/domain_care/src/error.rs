//! Care domain errors

use core_kernel::PortError;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors that can occur in the care domain
#[derive(Debug, Error)]
pub enum CareError {
    /// Field-level validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// The visit as a whole is not acceptable
    #[error("Invalid visit note: {0}")]
    InvalidVisit(String),

    /// The draft payload cannot be stored
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    #[error("Visit note not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[source] PortError),
}

impl CareError {
    pub fn invalid_visit(message: impl Into<String>) -> Self {
        CareError::InvalidVisit(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, CareError::Store(_))
    }
}

impl From<PortError> for CareError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { id, .. } => CareError::NotFound(id),
            PortError::Validation { message, .. } => CareError::InvalidVisit(message),
            other => CareError::Store(other),
        }
    }
}
