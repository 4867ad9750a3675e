//! Payment reconciliation rules
//!
//! Two pure functions carry the arithmetic of a charge:
//!
//! - [`check_chargeable`] runs before the gateway is contacted and rejects
//!   anything that could leave `amount_paid > total_amount`.
//! - [`reconcile`] computes the invoice figures after a successful charge:
//!   `amount_paid += amount`, `balance_due = total_amount - amount_paid`,
//!   and the status becomes `Paid` iff `balance_due <= 0`, otherwise it is
//!   left unchanged.
//!
//! `reconcile` never refuses a captured charge. Money already taken must be
//! recorded even if the invoice moved underneath it.

use serde::{Deserialize, Serialize};

use core_kernel::Money;

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus};

/// Invoice figures after applying one successful charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSettlement {
    pub amount_paid: Money,
    pub balance_due: Money,
    pub status: InvoiceStatus,
}

/// Validates that `amount` may be charged against `invoice`
pub fn check_chargeable(invoice: &Invoice, amount: &Money) -> Result<(), BillingError> {
    if amount.currency() != invoice.currency {
        return Err(BillingError::invalid_request(format!(
            "amount currency {} does not match invoice currency {}",
            amount.currency(),
            invoice.currency
        )));
    }
    if !amount.is_positive() {
        return Err(BillingError::invalid_request("amount must be greater than zero"));
    }
    if amount.round_to_currency() != *amount {
        return Err(BillingError::invalid_request(format!(
            "amount {} has more precision than {} allows",
            amount.amount(),
            amount.currency()
        )));
    }
    if !invoice.status.accepts_payment() {
        return Err(BillingError::invalid_request(format!(
            "invoice {} is {} and cannot be paid",
            invoice.invoice_number,
            invoice.status.as_str()
        )));
    }
    if *amount > invoice.balance_due {
        return Err(BillingError::invalid_request(format!(
            "amount {} exceeds balance due {}",
            amount, invoice.balance_due
        )));
    }
    Ok(())
}

/// Computes the invoice state after a successful charge of `amount`
pub fn reconcile(invoice: &Invoice, amount: &Money) -> Result<InvoiceSettlement, BillingError> {
    let amount_paid = invoice.amount_paid.checked_add(amount)?;
    let balance_due = invoice.total_amount.checked_sub(&amount_paid)?;
    let status = if balance_due.is_positive() {
        invoice.status
    } else {
        InvoiceStatus::Paid
    };

    Ok(InvoiceSettlement {
        amount_paid,
        balance_due,
        status,
    })
}
