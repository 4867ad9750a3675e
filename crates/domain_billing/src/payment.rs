//! Payment ledger entries
//!
//! One `Payment` is written for every charge attempt that reaches a gateway
//! verdict, successful or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ClientId, InvoiceId, Money, PaymentId};

use crate::idempotency::IdempotencyKey;

/// How the client paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankAccount,
    Check,
    Cash,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::BankAccount => "bank_account",
            PaymentMethod::Check => "check",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "card" => PaymentMethod::Card,
            "bank_account" | "us_bank_account" => PaymentMethod::BankAccount,
            "check" => PaymentMethod::Check,
            "cash" => PaymentMethod::Cash,
            _ => PaymentMethod::Other,
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// Status reported by the payment gateway for a charge
///
/// Only `Succeeded` settles an invoice; everything else is recorded as a
/// failed attempt with the status as its note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GatewayStatus {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresCapture,
    Canceled,
    /// The issuer declined the card
    Declined,
    Other(String),
}

impl GatewayStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, GatewayStatus::Succeeded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Succeeded => "succeeded",
            GatewayStatus::Processing => "processing",
            GatewayStatus::RequiresAction => "requires_action",
            GatewayStatus::RequiresPaymentMethod => "requires_payment_method",
            GatewayStatus::RequiresConfirmation => "requires_confirmation",
            GatewayStatus::RequiresCapture => "requires_capture",
            GatewayStatus::Canceled => "canceled",
            GatewayStatus::Declined => "declined",
            GatewayStatus::Other(s) => s,
        }
    }
}

impl From<String> for GatewayStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "succeeded" => GatewayStatus::Succeeded,
            "processing" => GatewayStatus::Processing,
            "requires_action" => GatewayStatus::RequiresAction,
            "requires_payment_method" => GatewayStatus::RequiresPaymentMethod,
            "requires_confirmation" => GatewayStatus::RequiresConfirmation,
            "requires_capture" => GatewayStatus::RequiresCapture,
            "canceled" => GatewayStatus::Canceled,
            "declined" => GatewayStatus::Declined,
            _ => GatewayStatus::Other(s),
        }
    }
}

impl From<&str> for GatewayStatus {
    fn from(s: &str) -> Self {
        GatewayStatus::from(s.to_string())
    }
}

impl From<GatewayStatus> for String {
    fn from(status: GatewayStatus) -> String {
        status.as_str().to_string()
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment record for one charge attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// 1-based attempt index on the invoice
    pub attempt_number: u32,
    pub idempotency_key: IdempotencyKey,
    /// Gateway-side identifier (payment intent id)
    pub gateway_reference: Option<String>,
    pub gateway_status: GatewayStatus,
    pub notes: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The parts of a payment shared by both outcomes
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub amount: Money,
    pub attempt_number: u32,
    pub idempotency_key: IdempotencyKey,
}

impl Payment {
    /// A captured charge
    pub fn completed(
        attempt: PaymentAttempt,
        method: PaymentMethod,
        gateway_reference: Option<String>,
    ) -> Self {
        Self::from_attempt(attempt, method, PaymentStatus::Completed, GatewayStatus::Succeeded, gateway_reference, None)
    }

    /// A charge the gateway did not complete; the status becomes the note
    pub fn failed(
        attempt: PaymentAttempt,
        method: PaymentMethod,
        gateway_status: GatewayStatus,
        gateway_reference: Option<String>,
        failure_message: Option<&str>,
    ) -> Self {
        let notes = match failure_message {
            Some(message) => format!("Gateway status: {} ({})", gateway_status, message),
            None => format!("Gateway status: {}", gateway_status),
        };
        Self::from_attempt(attempt, method, PaymentStatus::Failed, gateway_status, gateway_reference, Some(notes))
    }

    fn from_attempt(
        attempt: PaymentAttempt,
        method: PaymentMethod,
        status: PaymentStatus,
        gateway_status: GatewayStatus,
        gateway_reference: Option<String>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new_v7(),
            invoice_id: attempt.invoice_id,
            client_id: attempt.client_id,
            amount: attempt.amount,
            method,
            status,
            attempt_number: attempt.attempt_number,
            idempotency_key: attempt.idempotency_key,
            gateway_reference,
            gateway_status,
            notes,
            payment_date: now,
            created_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}
