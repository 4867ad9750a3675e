//! Email templates
//!
//! Plain-text bodies for the three messages the billing workflow sends:
//! the client receipt, the failed-payment alert to admins, and the invoice
//! itself. Dates are rendered in the agency's timezone.

use chrono::{DateTime, Utc};

use core_kernel::Timezone;

use crate::client::Client;
use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::payment::Payment;
use crate::ports::EmailMessage;

/// Renders billing emails with the agency's name and timezone
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    agency_name: String,
    timezone: Timezone,
}

impl EmailTemplates {
    pub fn new(agency_name: impl Into<String>, timezone: Timezone) -> Self {
        Self {
            agency_name: agency_name.into(),
            timezone,
        }
    }

    pub fn agency_name(&self) -> &str {
        &self.agency_name
    }

    pub fn timezone(&self) -> Timezone {
        self.timezone
    }

    /// Receipt sent to the client after a successful charge
    pub fn payment_receipt(
        &self,
        to: &str,
        client: &Client,
        invoice: &Invoice,
        payment: &Payment,
    ) -> EmailMessage {
        let mut body = format!(
            "Dear {},\n\n\
             Thank you for your payment to {}.\n\n\
             Invoice:        {}\n\
             Amount paid:    {}\n\
             Payment date:   {}\n\
             Remaining balance: {}\n",
            client.full_name,
            self.agency_name,
            invoice.invoice_number,
            payment.amount,
            self.timezone.format_timestamp(payment.payment_date),
            invoice.balance_due,
        );
        if let Some(reference) = &payment.gateway_reference {
            body.push_str(&format!("Reference:      {}\n", reference));
        }
        if !invoice.balance_due.is_positive() {
            body.push_str("\nThis invoice is now paid in full.\n");
        }
        body.push_str(&self.signature());

        EmailMessage {
            to: to.to_string(),
            subject: format!(
                "Payment received for invoice {}",
                invoice.invoice_number
            ),
            body,
        }
    }

    /// Alert sent to each admin when a charge does not succeed
    pub fn payment_failed_alert(
        &self,
        to: &str,
        client: &Client,
        invoice: &Invoice,
        payment: &Payment,
    ) -> EmailMessage {
        let body = format!(
            "A payment attempt did not succeed.\n\n\
             Client:         {} ({})\n\
             Invoice:        {}\n\
             Amount:         {}\n\
             Attempt:        {}\n\
             Gateway status: {}\n\
             Details:        {}\n\
             Attempted at:   {}\n\n\
             The invoice has not been changed. Balance due remains {}.\n",
            client.full_name,
            client.id,
            invoice.invoice_number,
            payment.amount,
            payment.attempt_number,
            payment.gateway_status,
            payment.notes.as_deref().unwrap_or("none"),
            self.timezone.format_timestamp(payment.created_at),
            invoice.balance_due,
        );

        EmailMessage {
            to: to.to_string(),
            subject: format!(
                "[{}] Payment failed for invoice {}",
                self.agency_name, invoice.invoice_number
            ),
            body,
        }
    }

    /// The invoice itself, as emailed to the client
    pub fn invoice(
        &self,
        to: &str,
        client: &Client,
        invoice: &Invoice,
        sent_at: DateTime<Utc>,
    ) -> Result<EmailMessage, BillingError> {
        let mut body = format!(
            "Dear {},\n\n\
             Please find your invoice from {} below.\n\n\
             Invoice:    {}\n\
             Issued:     {}\n\
             Due:        {}\n\n\
             Services\n",
            client.full_name,
            self.agency_name,
            invoice.invoice_number,
            Timezone::format_date(invoice.issue_date),
            Timezone::format_date(invoice.due_date),
        );

        for item in &invoice.items {
            let date = item
                .service_date
                .map(|d| format!(" ({})", Timezone::format_date(d)))
                .unwrap_or_default();
            body.push_str(&format!(
                "  - {}{}: {} x {} = {}\n",
                item.description,
                date,
                item.quantity.normalize(),
                item.unit_price,
                item.total()?,
            ));
        }

        body.push_str(&format!(
            "\nTotal:       {}\n\
             Paid:        {}\n\
             Balance due: {}\n",
            invoice.total_amount, invoice.amount_paid, invoice.balance_due,
        ));
        if let Some(notes) = &invoice.notes {
            body.push_str(&format!("\n{}\n", notes));
        }
        body.push_str(&format!(
            "\nSent {}.\n",
            self.timezone.format_timestamp(sent_at)
        ));
        body.push_str(&self.signature());

        Ok(EmailMessage {
            to: to.to_string(),
            subject: format!(
                "Invoice {} from {}",
                invoice.invoice_number, self.agency_name
            ),
            body,
        })
    }

    fn signature(&self) -> String {
        format!("\nKind regards,\n{}\n", self.agency_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::IdempotencyKey;
    use crate::invoice::{InvoiceItem, ServiceType};
    use crate::payment::{GatewayStatus, PaymentAttempt, PaymentMethod};
    use chrono::NaiveDate;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    fn fixtures() -> (EmailTemplates, Client, Invoice) {
        let templates = EmailTemplates::new("Sunrise Home Care", Timezone::default());
        let client = Client::new("Margaret Lee").with_email("margaret@example.com");
        let issue = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let due = NaiveDate::from_ymd_opt(2025, 4, 3).unwrap();
        let invoice = Invoice::new(client.id, issue, due, Currency::USD)
            .with_item(
                InvoiceItem::new(
                    "Personal care visit",
                    ServiceType::PersonalCare,
                    Money::new(dec!(32.50), Currency::USD),
                )
                .with_quantity(dec!(4))
                .on(issue),
            )
            .unwrap();
        (templates, client, invoice)
    }

    fn attempt(invoice: &Invoice) -> PaymentAttempt {
        PaymentAttempt {
            invoice_id: invoice.id,
            client_id: invoice.client_id,
            amount: Money::new(dec!(50), Currency::USD),
            attempt_number: 2,
            idempotency_key: IdempotencyKey::for_attempt(invoice.id, 2),
        }
    }

    #[test]
    fn test_receipt_mentions_amount_and_balance() {
        let (templates, client, invoice) = fixtures();
        let payment = Payment::completed(attempt(&invoice), PaymentMethod::Card, Some("pi_123".into()));

        let email = templates.payment_receipt("margaret@example.com", &client, &invoice, &payment);
        assert_eq!(email.to, "margaret@example.com");
        assert!(email.subject.contains(&invoice.invoice_number));
        assert!(email.body.contains("$50.00"));
        assert!(email.body.contains("$130.00"));
        assert!(email.body.contains("pi_123"));
        assert!(email.body.contains("Sunrise Home Care"));
    }

    #[test]
    fn test_failed_alert_carries_gateway_status() {
        let (templates, client, invoice) = fixtures();
        let payment = Payment::failed(
            attempt(&invoice),
            PaymentMethod::Card,
            GatewayStatus::Declined,
            None,
            Some("Your card has insufficient funds."),
        );

        let email = templates.payment_failed_alert("admin@example.com", &client, &invoice, &payment);
        assert!(email.subject.starts_with("[Sunrise Home Care]"));
        assert!(email.body.contains("declined"));
        assert!(email.body.contains("insufficient funds"));
        assert!(email.body.contains("Attempt:        2"));
    }

    #[test]
    fn test_invoice_lists_items_and_local_dates() {
        let (templates, client, invoice) = fixtures();
        let email = templates
            .invoice("margaret@example.com", &client, &invoice, Utc::now())
            .unwrap();

        assert!(email.body.contains("Personal care visit (March 4, 2025): 4 x $32.50 = $130.00"));
        assert!(email.body.contains("Due:        April 3, 2025"));
        assert!(email.body.contains("Balance due: $130.00"));
    }
}
