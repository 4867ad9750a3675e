//! Payment DTOs

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use domain_billing::PaymentOutcome;

/// Response body of `POST /payments`
///
/// Serialized untagged: a captured charge and a gateway refusal share the
/// `success` flag and differ in the remaining fields.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProcessPaymentResponse {
    Succeeded {
        success: bool,
        payment_id: Uuid,
        attempt_number: u32,
        amount: Decimal,
        amount_paid: Decimal,
        balance_due: Decimal,
        invoice_status: String,
    },
    Failed {
        success: bool,
        payment_id: Uuid,
        attempt_number: u32,
        gateway_status: String,
    },
}

impl From<&PaymentOutcome> for ProcessPaymentResponse {
    fn from(outcome: &PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Succeeded { payment, invoice } => ProcessPaymentResponse::Succeeded {
                success: true,
                payment_id: payment.id.into(),
                attempt_number: payment.attempt_number,
                amount: payment.amount.amount(),
                amount_paid: invoice.amount_paid.amount(),
                balance_due: invoice.balance_due.amount(),
                invoice_status: invoice.status.as_str().to_string(),
            },
            PaymentOutcome::Failed {
                payment,
                gateway_status,
            } => ProcessPaymentResponse::Failed {
                success: false,
                payment_id: payment.id.into(),
                attempt_number: payment.attempt_number,
                gateway_status: gateway_status.to_string(),
            },
        }
    }
}
