//! Invoice handlers

use std::str::FromStr;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use core_kernel::InvoiceId;
use domain_billing::{BillingError, Role};

use crate::auth::Claims;
use crate::dto::invoices::{InvoiceResponse, PaymentResponse, SendInvoiceResponse};
use crate::{error::ApiError, AppState};

fn parse_invoice_id(raw: &str) -> Result<InvoiceId, ApiError> {
    InvoiceId::from_str(raw).map_err(|_| ApiError::BadRequest(format!("malformed invoice id: {}", raw)))
}

/// Gets an invoice with its line items
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    claims.require(Role::Billing)?;
    let invoice = state
        .adapters
        .billing_store
        .get_invoice(parse_invoice_id(&id)?)
        .await
        .map_err(BillingError::from)?;
    Ok(Json(InvoiceResponse::from(&invoice)))
}

/// Lists every payment attempt on an invoice, oldest first
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    claims.require(Role::Billing)?;
    let invoice_id = parse_invoice_id(&id)?;
    let store = &state.adapters.billing_store;

    // 404 for unknown invoices rather than an empty list
    store.get_invoice(invoice_id).await.map_err(BillingError::from)?;
    let payments = store
        .list_payments(invoice_id)
        .await
        .map_err(BillingError::from)?;
    Ok(Json(payments.iter().map(PaymentResponse::from).collect()))
}

/// Emails the invoice to its client
pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<SendInvoiceResponse>, ApiError> {
    claims.require(Role::Admin)?;
    let delivery = state.invoices.send_invoice(parse_invoice_id(&id)?).await?;
    Ok(Json(SendInvoiceResponse::from(&delivery)))
}
