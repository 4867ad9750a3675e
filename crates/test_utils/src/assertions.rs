//! Custom Test Assertions
//!
//! Assertion helpers for billing invariants that give more meaningful
//! failure messages than a bare `assert_eq!`.

use core_kernel::Money;
use domain_billing::{Invoice, InvoiceStatus, Payment, PaymentStatus};
use rust_decimal::Decimal;

/// Asserts that two Money values are equal in both amount and currency
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Money amounts differ: actual={}, expected={}",
        actual.amount(),
        expected.amount()
    );
}

/// Asserts that money values sum to a total
///
/// # Panics
///
/// Panics if the currencies differ or the sum doesn't equal the total
pub fn assert_money_sum_equals(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts).expect("parts share the total's currency");
    assert_money_eq(&sum, total);
}

/// Asserts `balance_due = total_amount - amount_paid`
pub fn assert_invoice_balanced(invoice: &Invoice) {
    let expected = invoice.total_amount.amount() - invoice.amount_paid.amount();
    assert_eq!(
        invoice.balance_due.amount(),
        expected,
        "Invoice {} out of balance: total={}, paid={}, balance_due={}",
        invoice.invoice_number,
        invoice.total_amount.amount(),
        invoice.amount_paid.amount(),
        invoice.balance_due.amount()
    );
}

/// Asserts the invoice is `Paid` exactly when nothing is left to pay
pub fn assert_paid_status_consistent(invoice: &Invoice) {
    let settled = invoice.balance_due.amount() <= Decimal::ZERO;
    assert_eq!(
        invoice.status == InvoiceStatus::Paid,
        settled,
        "Invoice {} has status {} with balance_due={}",
        invoice.invoice_number,
        invoice.status.as_str(),
        invoice.balance_due.amount()
    );
}

/// Asserts the invoice's `amount_paid` equals the sum of its completed payments
pub fn assert_paid_matches_payments(invoice: &Invoice, payments: &[Payment]) {
    let completed: Vec<Money> = payments
        .iter()
        .filter(|p| p.invoice_id == invoice.id && p.status == PaymentStatus::Completed)
        .map(|p| p.amount)
        .collect();
    assert_money_sum_equals(&completed, &invoice.amount_paid);
}

/// Asserts attempt numbers run 1..=n with no gaps or repeats
pub fn assert_attempts_sequential(payments: &[Payment]) {
    let mut attempts: Vec<u32> = payments.iter().map(|p| p.attempt_number).collect();
    attempts.sort_unstable();
    let expected: Vec<u32> = (1..=payments.len() as u32).collect();
    assert_eq!(attempts, expected, "Attempt numbers are not sequential");
}

/// Asserts that a Result is an error matching a pattern
#[macro_export]
macro_rules! assert_err_matches {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Err(e) => panic!("Expected error matching {}, got {:?}", stringify!($pattern), e),
            Ok(v) => panic!("Expected error, got Ok({:?})", v),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{TestInvoiceBuilder, TestPaymentBuilder};
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_sum_equals() {
        let parts = vec![
            Money::new(dec!(50), Currency::USD),
            Money::new(dec!(30), Currency::USD),
        ];
        assert_money_sum_equals(&parts, &Money::new(dec!(80), Currency::USD));
    }

    #[test]
    #[should_panic(expected = "Money amounts differ")]
    fn test_money_eq_reports_difference() {
        assert_money_eq(
            &Money::new(dec!(10), Currency::USD),
            &Money::new(dec!(11), Currency::USD),
        );
    }

    #[test]
    fn test_paid_matches_payments() {
        let invoice = TestInvoiceBuilder::new().with_amount_paid(dec!(50.00)).build();
        let payments = vec![
            TestPaymentBuilder::against(&invoice).attempt(1).declined().build(),
            TestPaymentBuilder::against(&invoice).attempt(2).build(),
        ];
        assert_invoice_balanced(&invoice);
        assert_paid_status_consistent(&invoice);
        assert_paid_matches_payments(&invoice, &payments);
        assert_attempts_sequential(&payments);
    }

    #[test]
    #[should_panic(expected = "has status")]
    fn test_paid_status_inconsistency_detected() {
        let invoice = TestInvoiceBuilder::new().with_status(InvoiceStatus::Paid).build();
        assert_paid_status_consistent(&invoice);
    }

    #[test]
    fn test_err_matches_macro() {
        let result: Result<(), &str> = Err("boom");
        assert_err_matches!(result, "boom");
    }
}
