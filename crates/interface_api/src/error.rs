//! API error handling
//!
//! Domain errors are mapped onto HTTP statuses here. Store and internal
//! failures are logged in full and answered with a generic message.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_billing::BillingError;
use domain_care::CareError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },

    /// An upstream provider (payment gateway, email relay) failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
                None,
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Validation { message, details } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                message,
                Some(details),
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg, None),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            BillingError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} not found: {}", entity, id))
            }
            BillingError::InvalidOperation(msg) => ApiError::Validation {
                message: msg,
                details: Vec::new(),
            },
            BillingError::Money(e) => ApiError::BadRequest(e.to_string()),
            BillingError::Conflict(msg) => ApiError::Conflict(msg),
            BillingError::Gateway(e) => {
                error!(error = %e, "Payment gateway failure");
                ApiError::Upstream(gateway_message(&e).to_string())
            }
            BillingError::Notification(e) => {
                error!(error = %e, "Email delivery failure");
                ApiError::Upstream("Email could not be delivered; please retry".to_string())
            }
            BillingError::Store(e) => ApiError::Internal(e.to_string()),
            BillingError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

fn gateway_message(err: &PortError) -> &'static str {
    if err.is_transient() {
        "Payment provider is temporarily unavailable; no charge was made, please retry"
    } else {
        "Payment provider rejected the request"
    }
}

impl From<CareError> for ApiError {
    fn from(err: CareError) -> Self {
        match err {
            CareError::Validation(errors) => {
                let mut details: Vec<String> = errors
                    .field_errors()
                    .iter()
                    .flat_map(|(field, errs)| {
                        errs.iter().map(move |e| match &e.message {
                            Some(msg) => format!("{}: {}", field, msg),
                            None => format!("{}: {}", field, e.code),
                        })
                    })
                    .collect();
                details.extend(errors.errors().iter().filter_map(|(field, kind)| match kind {
                    validator::ValidationErrorsKind::Struct(nested) => {
                        Some(format!("{}: {}", field, nested))
                    }
                    _ => None,
                }));
                details.sort();
                ApiError::Validation {
                    message: "Visit note failed validation".to_string(),
                    details,
                }
            }
            CareError::InvalidVisit(msg) => ApiError::Validation {
                message: msg,
                details: Vec::new(),
            },
            CareError::InvalidDraft(msg) => ApiError::BadRequest(msg),
            CareError::NotFound(msg) => ApiError::NotFound(msg),
            CareError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
