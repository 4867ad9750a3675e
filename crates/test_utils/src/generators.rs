//! Property-Based Test Generators
//!
//! Proptest strategies for invoices and payment sequences that respect the
//! billing model's constraints.

use core_kernel::{Currency, Money};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::builders::TestInvoiceBuilder;
use domain_billing::Invoice;

/// Strategy for the currencies the agency bills in
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![Just(Currency::USD), Just(Currency::CAD)]
}

/// Strategy for cent amounts between 0.01 and 10,000.00
pub fn positive_cents_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000i64
}

/// Strategy for positive USD amounts
pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    positive_cents_strategy().prop_map(|cents| Money::from_minor(cents, Currency::USD))
}

/// Strategy for a billable quantity of hours, in quarter hours up to 12
pub fn hours_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=48i64).prop_map(|quarters| Decimal::new(quarters * 25, 2))
}

/// Strategy for an unpaid USD draft invoice with a positive total
pub fn invoice_strategy() -> impl Strategy<Value = Invoice> {
    (hours_strategy(), 1_500i64..12_000i64).prop_map(|(hours, rate_cents)| {
        TestInvoiceBuilder::new()
            .with_hours(hours, Decimal::new(rate_cents, 2))
            .build()
    })
}

/// Strategy for a sequence of partial payments, in cents
pub fn payment_sequence_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(positive_cents_strategy(), 1..8)
}
