//! Invoice management
//!
//! Invoices bill a client for care services. The paid/balance figures are
//! only changed through [`crate::reconciliation`], which keeps
//! `balance_due == total_amount - amount_paid` and owns the `Paid`
//! transition.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{ClientId, Currency, InvoiceId, Money};

use crate::error::BillingError;
use crate::reconciliation::InvoiceSettlement;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Being prepared, not yet sent to the client
    Draft,
    /// Emailed to the client
    Sent,
    /// Balance fully settled
    Paid,
    /// Past due date with a balance outstanding
    Overdue,
    /// Voided; cannot be paid
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether a charge may be taken against an invoice in this status
    pub fn accepts_payment(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Overdue
        )
    }
}

/// An invoice for care services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Human-readable number printed on emails
    pub invoice_number: String,
    pub client_id: ClientId,
    pub currency: Currency,
    pub items: Vec<InvoiceItem>,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub balance_due: Money,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    /// Incremented by the store on every persisted change
    pub version: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates an empty draft invoice
    pub fn new(client_id: ClientId, issue_date: NaiveDate, due_date: NaiveDate, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: InvoiceId::new_v7(),
            invoice_number: generate_invoice_number(issue_date),
            client_id,
            currency,
            items: Vec::new(),
            total_amount: Money::zero(currency),
            amount_paid: Money::zero(currency),
            balance_due: Money::zero(currency),
            status: InvoiceStatus::Draft,
            issue_date,
            due_date,
            notes: None,
            version: 0,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a line item and recomputes totals
    ///
    /// Items can only be added before any money has been received.
    pub fn add_item(&mut self, item: InvoiceItem) -> Result<(), BillingError> {
        if !self.amount_paid.is_zero() || !self.status.accepts_payment() {
            return Err(BillingError::InvalidOperation(format!(
                "cannot add items to {} invoice {}",
                self.status.as_str(),
                self.invoice_number
            )));
        }
        if item.unit_price.currency() != self.currency {
            return Err(BillingError::InvalidOperation(format!(
                "item currency {} does not match invoice currency {}",
                item.unit_price.currency(),
                self.currency
            )));
        }
        self.items.push(item);
        self.recalculate_totals()
    }

    /// Builder-style variant of [`Invoice::add_item`]
    pub fn with_item(mut self, item: InvoiceItem) -> Result<Self, BillingError> {
        self.add_item(item)?;
        Ok(self)
    }

    /// Records that the invoice was emailed to the client
    ///
    /// Only drafts change status; re-sending keeps the current status.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        if self.status == InvoiceStatus::Draft {
            self.status = InvoiceStatus::Sent;
        }
        self.sent_at = Some(at);
        self.updated_at = at;
    }

    /// Voids an invoice that has not received any payment
    pub fn cancel(&mut self) -> Result<(), BillingError> {
        if !self.amount_paid.is_zero() {
            return Err(BillingError::InvalidOperation(format!(
                "invoice {} has payments and cannot be cancelled",
                self.invoice_number
            )));
        }
        self.status = InvoiceStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Checks if the invoice is past due as of `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        today > self.due_date && self.status.accepts_payment() && self.balance_due.is_positive()
    }

    /// Applies a reconciled payment produced by [`crate::reconciliation::reconcile`]
    pub(crate) fn apply_settlement(&mut self, settlement: &InvoiceSettlement, at: DateTime<Utc>) {
        self.amount_paid = settlement.amount_paid;
        self.balance_due = settlement.balance_due;
        self.status = settlement.status;
        self.updated_at = at;
    }

    fn recalculate_totals(&mut self) -> Result<(), BillingError> {
        let line_totals = self
            .items
            .iter()
            .map(InvoiceItem::total)
            .collect::<Result<Vec<_>, _>>()?;
        self.total_amount = Money::sum(self.currency, &line_totals)?;
        self.balance_due = self.total_amount.checked_sub(&self.amount_paid)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A billed service line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub description: String,
    pub service_type: ServiceType,
    /// Date the service was delivered, when billed per visit
    pub service_date: Option<NaiveDate>,
    /// Hours or visits
    pub quantity: Decimal,
    pub unit_price: Money,
}

impl InvoiceItem {
    pub fn new(description: impl Into<String>, service_type: ServiceType, unit_price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            service_type,
            service_date: None,
            quantity: Decimal::ONE,
            unit_price,
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn on(mut self, service_date: NaiveDate) -> Self {
        self.service_date = Some(service_date);
        self
    }

    /// Line total, rounded to the currency's precision
    pub fn total(&self) -> Result<Money, BillingError> {
        Ok(self.unit_price.checked_mul(self.quantity)?.round_to_currency())
    }
}

/// Kinds of care services billed by the agency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    PersonalCare,
    Companionship,
    SkilledNursing,
    RespiteCare,
    DementiaCare,
    Other,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::PersonalCare => "personal_care",
            ServiceType::Companionship => "companionship",
            ServiceType::SkilledNursing => "skilled_nursing",
            ServiceType::RespiteCare => "respite_care",
            ServiceType::DementiaCare => "dementia_care",
            ServiceType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "personal_care" => ServiceType::PersonalCare,
            "companionship" => ServiceType::Companionship,
            "skilled_nursing" => ServiceType::SkilledNursing,
            "respite_care" => ServiceType::RespiteCare,
            "dementia_care" => ServiceType::DementiaCare,
            _ => ServiceType::Other,
        }
    }
}

/// Invoice numbers read `INV-YYYYMM-XXXXXX`
fn generate_invoice_number(issue_date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("INV-{}-{}", issue_date.format("%Y%m"), suffix)
}
