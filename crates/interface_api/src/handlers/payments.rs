//! Payment handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};

use domain_billing::{ProcessPaymentRequest, Role};

use crate::auth::Claims;
use crate::dto::payments::ProcessPaymentResponse;
use crate::{error::ApiError, AppState};

/// Charges a client's saved payment method against an invoice
///
/// 200 when the charge was captured, 402 when the gateway refused it. Both
/// carry the id of the recorded payment.
pub async fn process_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ProcessPaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    claims.require(Role::Billing)?;
    let Json(request) = payload?;

    let outcome = state.payments.process_payment(request).await?;
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::PAYMENT_REQUIRED
    };

    Ok((status, Json(ProcessPaymentResponse::from(&outcome))).into_response())
}
