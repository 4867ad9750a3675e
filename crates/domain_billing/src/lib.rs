//! Billing Domain - Payment Capture and Reconciliation
//!
//! This crate owns the money side of the agency: clients, invoices and the
//! payments taken against them.
//!
//! # Payment Workflow
//!
//! [`PaymentService::process_payment`] charges the client's saved payment
//! method through a [`PaymentGateway`] and reconciles the invoice:
//!
//! - `amount_paid += amount`, `balance_due = total_amount - amount_paid`
//! - the invoice becomes `Paid` iff `balance_due <= 0`
//! - every gateway verdict produces exactly one `Payment` record
//! - a failed charge never changes the invoice
//!
//! Charges carry an idempotency key derived from the invoice and the
//! attempt number, so a retried request cannot charge twice.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{PaymentService, ProcessPaymentRequest, PaymentOutcome};
//!
//! let outcome = service
//!     .process_payment(ProcessPaymentRequest::new(client_id, invoice_id, dec!(150), "pm_123"))
//!     .await?;
//!
//! if let PaymentOutcome::Succeeded { invoice, .. } = outcome {
//!     println!("Balance due: {}", invoice.balance_due);
//! }
//! ```

pub mod adapters;
pub mod client;
pub mod error;
pub mod idempotency;
pub mod invoice;
pub mod invoicing;
pub mod notification;
pub mod payment;
pub mod ports;
pub mod reconciliation;
pub mod service;

pub use client::Client;
pub use error::BillingError;
pub use idempotency::IdempotencyKey;
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus, ServiceType};
pub use invoicing::{InvoiceDelivery, InvoiceMailer};
pub use notification::EmailTemplates;
pub use payment::{GatewayStatus, Payment, PaymentAttempt, PaymentMethod, PaymentStatus};
pub use ports::{
    BillingStore, ChargeOutcome, ChargeRequest, EmailMessage, Notifier, PaymentGateway, Role,
    StaffDirectory, StaffUser,
};
pub use reconciliation::{check_chargeable, reconcile, InvoiceSettlement};
pub use service::{PaymentOutcome, PaymentService, ProcessPaymentRequest, ValidatedPaymentRequest};
