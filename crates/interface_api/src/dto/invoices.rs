//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use domain_billing::{Invoice, InvoiceDelivery, InvoiceItem, Payment};

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub client_id: Uuid,
    pub currency: String,
    pub items: Vec<InvoiceItemResponse>,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub sent_at: Option<DateTime<Utc>>,
    pub version: i64,
}

#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub description: String,
    pub service_type: String,
    pub service_date: Option<NaiveDate>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl From<&InvoiceItem> for InvoiceItemResponse {
    fn from(item: &InvoiceItem) -> Self {
        Self {
            description: item.description.clone(),
            service_type: item.service_type.as_str().to_string(),
            service_date: item.service_date,
            quantity: item.quantity,
            unit_price: item.unit_price.amount(),
        }
    }
}

impl From<&Invoice> for InvoiceResponse {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.into(),
            invoice_number: invoice.invoice_number.clone(),
            client_id: invoice.client_id.into(),
            currency: invoice.currency.code().to_string(),
            items: invoice.items.iter().map(InvoiceItemResponse::from).collect(),
            total_amount: invoice.total_amount.amount(),
            amount_paid: invoice.amount_paid.amount(),
            balance_due: invoice.balance_due.amount(),
            status: invoice.status.as_str().to_string(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            sent_at: invoice.sent_at,
            version: invoice.version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub attempt_number: u32,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub gateway_status: String,
    pub gateway_reference: Option<String>,
    pub notes: Option<String>,
    pub payment_date: DateTime<Utc>,
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id.into(),
            attempt_number: payment.attempt_number,
            amount: payment.amount.amount(),
            currency: payment.amount.currency().code().to_string(),
            method: payment.method.as_str().to_string(),
            status: payment.status.as_str().to_string(),
            gateway_status: payment.gateway_status.to_string(),
            gateway_reference: payment.gateway_reference.clone(),
            notes: payment.notes.clone(),
            payment_date: payment.payment_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendInvoiceResponse {
    pub invoice_id: Uuid,
    pub recipient: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

impl From<&InvoiceDelivery> for SendInvoiceResponse {
    fn from(delivery: &InvoiceDelivery) -> Self {
        Self {
            invoice_id: delivery.invoice.id.into(),
            recipient: delivery.recipient.clone(),
            status: delivery.invoice.status.as_str().to_string(),
            sent_at: delivery.sent_at,
        }
    }
}
