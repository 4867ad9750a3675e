//! Billing domain errors

use core_kernel::{MoneyError, PortError};
use thiserror::Error;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// The request was malformed or violates a precondition; nothing was charged
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced client or invoice does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// The operation is not allowed in the entity's current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The payment gateway could not be reached or gave no verdict
    #[error("Payment gateway error: {0}")]
    Gateway(#[source] PortError),

    /// The attempt was already recorded by a concurrent request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Email delivery failed where delivery is the point of the operation
    #[error("Notification failed: {0}")]
    Notification(#[source] PortError),

    /// Calculation error
    #[error("Calculation error: {0}")]
    Money(#[from] MoneyError),

    /// The entity store failed
    #[error("Store error: {0}")]
    Store(#[source] PortError),

    /// A failure the caller cannot act on; details are logged, not returned
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        BillingError::InvalidRequest(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        BillingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the failure happened before anything was sent to the gateway
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::InvalidRequest(_)
                | BillingError::NotFound { .. }
                | BillingError::InvalidOperation(_)
        )
    }
}

impl From<PortError> for BillingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => BillingError::NotFound {
                entity: match entity_type.as_str() {
                    "Client" => "Client",
                    "Invoice" => "Invoice",
                    "Payment" => "Payment",
                    _ => "Entity",
                },
                id,
            },
            PortError::Conflict { message } => BillingError::Conflict(message),
            PortError::Validation { message, .. } => BillingError::InvalidRequest(message),
            other => BillingError::Store(other),
        }
    }
}
