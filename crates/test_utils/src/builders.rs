//! Test Data Builders
//!
//! Builder patterns for constructing invoices, payments and visit notes
//! with sensible defaults. Tests specify only the fields they care about.

use chrono::{NaiveDate, NaiveTime};
use core_kernel::{ClientId, Currency, Money};
use domain_billing::{
    reconcile, IdempotencyKey, Invoice, InvoiceItem, InvoiceStatus, Payment, PaymentAttempt,
    PaymentMethod, GatewayStatus, ServiceType,
};
use domain_care::{VisitNoteInput, Vitals};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{IdFixtures, StringFixtures, TemporalFixtures};

/// Builder for invoices
///
/// Defaults to a USD draft for the fixture client with one line of five
/// personal care hours at 40.00, a total of 200.00.
pub struct TestInvoiceBuilder {
    client_id: ClientId,
    currency: Currency,
    lines: Vec<(String, ServiceType, Decimal, Decimal)>,
    paid: Option<Decimal>,
    status: Option<InvoiceStatus>,
    issue_date: NaiveDate,
    due_date: NaiveDate,
}

impl Default for TestInvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestInvoiceBuilder {
    pub fn new() -> Self {
        Self {
            client_id: IdFixtures::client_id(),
            currency: Currency::USD,
            lines: vec![(
                "Personal care".to_string(),
                ServiceType::PersonalCare,
                dec!(5),
                dec!(40.00),
            )],
            paid: None,
            status: None,
            issue_date: TemporalFixtures::issue_date(),
            due_date: TemporalFixtures::due_date(),
        }
    }

    pub fn for_client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Replaces the default line with a single line totalling `total`
    pub fn with_total(mut self, total: Decimal) -> Self {
        self.lines = vec![(
            "Care services".to_string(),
            ServiceType::PersonalCare,
            Decimal::ONE,
            total,
        )];
        self
    }

    /// Replaces the default line with `hours` of personal care at `rate`
    pub fn with_hours(mut self, hours: Decimal, rate: Decimal) -> Self {
        self.lines = vec![("Personal care".to_string(), ServiceType::PersonalCare, hours, rate)];
        self
    }

    /// Adds a line on top of the current ones
    pub fn with_line(
        mut self,
        description: impl Into<String>,
        service_type: ServiceType,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        self.lines.push((description.into(), service_type, quantity, unit_price));
        self
    }

    /// Applies a prior payment of `amount` through reconciliation
    pub fn with_amount_paid(mut self, amount: Decimal) -> Self {
        self.paid = Some(amount);
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Builds the invoice
    ///
    /// # Panics
    ///
    /// Panics if the lines or prior payment are inconsistent with the currency.
    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(self.client_id, self.issue_date, self.due_date, self.currency);
        for (description, service_type, quantity, unit_price) in self.lines {
            let item = InvoiceItem::new(description, service_type, Money::new(unit_price, self.currency))
                .with_quantity(quantity)
                .on(TemporalFixtures::visit_date());
            invoice.add_item(item).expect("invoice line");
        }

        if let Some(paid) = self.paid {
            let settlement =
                reconcile(&invoice, &Money::new(paid, self.currency)).expect("prior payment");
            invoice.amount_paid = settlement.amount_paid;
            invoice.balance_due = settlement.balance_due;
            invoice.status = settlement.status;
        }
        if let Some(status) = self.status {
            invoice.status = status;
        }
        invoice
    }
}

/// Builder for payment records as the store would hold them
pub struct TestPaymentBuilder {
    invoice: Invoice,
    amount: Decimal,
    attempt_number: u32,
    succeeded: bool,
}

impl TestPaymentBuilder {
    /// A completed payment of 50.00 against `invoice`, as attempt 1
    pub fn against(invoice: &Invoice) -> Self {
        Self {
            invoice: invoice.clone(),
            amount: dec!(50.00),
            attempt_number: 1,
            succeeded: true,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number;
        self
    }

    pub fn declined(mut self) -> Self {
        self.succeeded = false;
        self
    }

    pub fn build(self) -> Payment {
        let attempt = PaymentAttempt {
            invoice_id: self.invoice.id,
            client_id: self.invoice.client_id,
            amount: Money::new(self.amount, self.invoice.currency),
            attempt_number: self.attempt_number,
            idempotency_key: IdempotencyKey::for_attempt(self.invoice.id, self.attempt_number),
        };

        if self.succeeded {
            Payment::completed(
                attempt,
                PaymentMethod::Card,
                Some(StringFixtures::gateway_reference().to_string()),
            )
        } else {
            Payment::failed(
                attempt,
                PaymentMethod::Card,
                GatewayStatus::Declined,
                None,
                Some("Your card was declined."),
            )
        }
    }
}

/// Builder for visit note submissions
pub struct VisitNoteInputBuilder {
    input: VisitNoteInput,
}

impl Default for VisitNoteInputBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitNoteInputBuilder {
    /// A valid morning visit for the fixture client
    pub fn new() -> Self {
        Self {
            input: VisitNoteInput {
                client_id: IdFixtures::client_id(),
                visit_date: TemporalFixtures::visit_date(),
                start_time: TemporalFixtures::visit_start(),
                end_time: TemporalFixtures::visit_end(),
                tasks_performed: StringFixtures::tasks(),
                client_condition: Some("Alert and in good spirits".to_string()),
                vitals: None,
                notes: None,
                follow_up_required: false,
            },
        }
    }

    pub fn for_client(mut self, client_id: ClientId) -> Self {
        self.input.client_id = client_id;
        self
    }

    pub fn window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.input.start_time = start;
        self.input.end_time = end;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.input.tasks_performed = tasks;
        self
    }

    pub fn with_vitals(mut self, blood_pressure: &str, pulse: u16, temperature_f: f64) -> Self {
        self.input.vitals = Some(Vitals {
            blood_pressure: Some(blood_pressure.to_string()),
            pulse: Some(pulse),
            temperature_f: Some(temperature_f),
        });
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.input.notes = Some(notes.into());
        self
    }

    pub fn needs_follow_up(mut self) -> Self {
        self.input.follow_up_required = true;
        self
    }

    pub fn build(self) -> VisitNoteInput {
        self.input
    }
}
