//! Entity tests for domain_billing

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;

use core_kernel::{ClientId, Currency, InvoiceId, Money, MoneyError};

use domain_billing::client::Client;
use domain_billing::error::BillingError;
use domain_billing::idempotency::IdempotencyKey;
use domain_billing::invoice::{Invoice, InvoiceItem, InvoiceStatus, ServiceType};
use domain_billing::payment::{GatewayStatus, Payment, PaymentAttempt, PaymentMethod, PaymentStatus};
use domain_billing::ports::Role;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usd(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

// ============================================================================
// Client Tests
// ============================================================================

mod client_tests {
    use super::*;

    #[test]
    fn test_client_new() {
        let client = Client::new("Margaret Lee");
        assert_eq!(client.full_name, "Margaret Lee");
        assert!(client.is_active);
        assert!(client.email.is_none());
        assert!(client.contact_email().is_none());
    }

    #[test]
    fn test_contact_email_ignores_blank() {
        let blank = Client::new("A").with_email("   ");
        assert!(blank.contact_email().is_none());

        let padded = Client::new("B").with_email(" b@example.com ");
        assert_eq!(padded.contact_email(), Some("b@example.com"));
    }
}

// ============================================================================
// Invoice Tests
// ============================================================================

mod invoice_tests {
    use super::*;

    fn draft() -> Invoice {
        Invoice::new(ClientId::new(), date(2025, 2, 1), date(2025, 2, 28), Currency::USD)
    }

    #[test]
    fn test_invoice_new_is_empty_draft() {
        let invoice = draft();
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(invoice.total_amount.is_zero());
        assert!(invoice.balance_due.is_zero());
        assert_eq!(invoice.version, 0);
        assert!(invoice.invoice_number.starts_with("INV-202502-"));
        assert_eq!(invoice.invoice_number.len(), "INV-202502-".len() + 6);
    }

    #[test]
    fn test_items_drive_totals() {
        let invoice = draft()
            .with_item(
                InvoiceItem::new("Personal care", ServiceType::PersonalCare, usd(dec!(28.75)))
                    .with_quantity(dec!(6)),
            )
            .unwrap()
            .with_item(InvoiceItem::new(
                "Medication review",
                ServiceType::SkilledNursing,
                usd(dec!(85)),
            ))
            .unwrap();

        assert_eq!(invoice.total_amount, usd(dec!(257.50)));
        assert_eq!(invoice.balance_due, usd(dec!(257.50)));
        assert!(invoice.amount_paid.is_zero());
    }

    #[test]
    fn test_item_total_rounds_to_cents() {
        let item = InvoiceItem::new("Partial hour", ServiceType::Companionship, usd(dec!(25)))
            .with_quantity(dec!(0.333));
        assert_eq!(item.total().unwrap(), usd(dec!(8.32)));
    }

    #[test]
    fn test_item_currency_must_match() {
        let err = draft()
            .with_item(InvoiceItem::new(
                "Respite",
                ServiceType::RespiteCare,
                Money::new(dec!(10), Currency::EUR),
            ))
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidOperation(_)));
    }

    #[test]
    fn test_items_rejected_once_paid() {
        let mut invoice = draft()
            .with_item(InvoiceItem::new("Visit", ServiceType::PersonalCare, usd(dec!(50))))
            .unwrap();
        invoice.amount_paid = usd(dec!(10));

        let result = invoice.add_item(InvoiceItem::new("Extra", ServiceType::Other, usd(dec!(5))));
        assert!(result.is_err());
    }

    #[test]
    fn test_mark_sent_only_moves_drafts() {
        let mut invoice = draft();
        let at = Utc::now();
        invoice.mark_sent(at);
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.sent_at, Some(at));

        invoice.status = InvoiceStatus::Overdue;
        invoice.mark_sent(Utc::now());
        assert_eq!(invoice.status, InvoiceStatus::Overdue);
    }

    #[test]
    fn test_cancel_requires_no_payments() {
        let mut invoice = draft();
        invoice.cancel().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
        assert!(!invoice.status.accepts_payment());

        let mut paid_some = draft();
        paid_some.amount_paid = usd(dec!(1));
        assert!(paid_some.cancel().is_err());
    }

    #[test]
    fn test_is_overdue() {
        let invoice = draft()
            .with_item(InvoiceItem::new("Visit", ServiceType::PersonalCare, usd(dec!(50))))
            .unwrap();
        assert!(!invoice.is_overdue(date(2025, 2, 28)));
        assert!(invoice.is_overdue(date(2025, 3, 1)));
        assert!(!draft().is_overdue(date(2025, 3, 1)));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::parse("partially_paid"), None);
    }
}

// ============================================================================
// Payment Tests
// ============================================================================

mod payment_tests {
    use super::*;

    fn attempt() -> PaymentAttempt {
        let invoice_id = InvoiceId::new();
        PaymentAttempt {
            invoice_id,
            client_id: ClientId::new(),
            amount: usd(dec!(75)),
            attempt_number: 3,
            idempotency_key: IdempotencyKey::for_attempt(invoice_id, 3),
        }
    }

    #[test]
    fn test_completed_payment() {
        let payment = Payment::completed(attempt(), PaymentMethod::Card, Some("pi_1".to_string()));
        assert!(payment.is_completed());
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.gateway_status, GatewayStatus::Succeeded);
        assert!(payment.notes.is_none());
        assert_eq!(payment.attempt_number, 3);
    }

    #[test]
    fn test_failed_payment_notes_gateway_status() {
        let payment = Payment::failed(
            attempt(),
            PaymentMethod::Card,
            GatewayStatus::RequiresPaymentMethod,
            None,
            None,
        );
        assert!(!payment.is_completed());
        assert_eq!(
            payment.notes.as_deref(),
            Some("Gateway status: requires_payment_method")
        );
    }

    #[test]
    fn test_gateway_status_parsing() {
        assert_eq!(GatewayStatus::from("succeeded"), GatewayStatus::Succeeded);
        assert_eq!(GatewayStatus::from("canceled"), GatewayStatus::Canceled);
        assert_eq!(
            GatewayStatus::from("something_new"),
            GatewayStatus::Other("something_new".to_string())
        );
        assert!(!GatewayStatus::from("processing").is_succeeded());
    }

    #[test]
    fn test_gateway_status_serializes_as_text() {
        let json = serde_json::to_string(&GatewayStatus::RequiresAction).unwrap();
        assert_eq!(json, "\"requires_action\"");
        let back: GatewayStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GatewayStatus::RequiresAction);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("us_bank_account"), PaymentMethod::BankAccount);
        assert_eq!(PaymentMethod::parse("card"), PaymentMethod::Card);
        assert_eq!(PaymentMethod::parse("klarna"), PaymentMethod::Other);
    }
}

// ============================================================================
// Error Tests
// ============================================================================

mod error_tests {
    use super::*;
    use core_kernel::PortError;

    #[test]
    fn test_port_not_found_maps_entity() {
        let err: BillingError = PortError::not_found("Invoice", "abc").into();
        assert!(matches!(err, BillingError::NotFound { entity: "Invoice", .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_transient_port_error_is_store_error() {
        let err: BillingError = PortError::connection("pool exhausted").into();
        assert!(matches!(err, BillingError::Store(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_rejected_reference_is_client_error() {
        let err: BillingError = PortError::validation("client does not exist").into();
        assert!(matches!(err, BillingError::InvalidRequest(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_money_error_converts() {
        let err: BillingError = MoneyError::Overflow.into();
        assert!(matches!(err, BillingError::Money(_)));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("root"), None);
    }
}
