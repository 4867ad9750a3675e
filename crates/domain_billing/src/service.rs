//! Payment capture and reconciliation
//!
//! [`PaymentService::process_payment`] takes a client's payment against an
//! invoice through the gateway and records the result:
//!
//! 1. Validate the request and load the client and invoice. Anything
//!    malformed fails here, before the gateway is contacted.
//! 2. Charge the gateway with an idempotency key derived from the invoice
//!    and the attempt number (recorded payments + 1).
//! 3. On `succeeded`, write the completed payment and the reconciled invoice
//!    in one store transaction, then email the client a receipt.
//! 4. On any other verdict, write a failed payment, leave the invoice alone
//!    and alert every admin.
//!
//! A gateway call that produces no verdict (timeout, 5xx, open circuit)
//! records nothing, so retrying reuses the same key and cannot double-charge.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{ClientId, InvoiceId, Money, PortError};

use crate::client::Client;
use crate::error::BillingError;
use crate::idempotency::IdempotencyKey;
use crate::invoice::Invoice;
use crate::notification::EmailTemplates;
use crate::payment::{GatewayStatus, Payment, PaymentAttempt};
use crate::ports::{
    BillingStore, ChargeOutcome, ChargeRequest, Notifier, PaymentGateway, Role, StaffDirectory,
};
use crate::reconciliation::{check_chargeable, reconcile};

/// How many times a settlement is re-reconciled after losing a version race
const MAX_SETTLEMENT_RETRIES: usize = 3;

/// Raw payment request as received from the portal
///
/// Every field is optional so that absence can be reported as an
/// `InvalidRequest` rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessPaymentRequest {
    pub client_id: Option<String>,
    pub invoice_id: Option<String>,
    pub amount: Option<Decimal>,
    pub payment_method_id: Option<String>,
}

/// A request whose fields are all present and well-formed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPaymentRequest {
    pub client_id: ClientId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub payment_method_id: String,
}

impl ProcessPaymentRequest {
    pub fn new(
        client_id: ClientId,
        invoice_id: InvoiceId,
        amount: Decimal,
        payment_method_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            invoice_id: Some(invoice_id.to_string()),
            amount: Some(amount),
            payment_method_id: Some(payment_method_id.into()),
        }
    }

    /// Checks presence and shape of every field
    pub fn validate(&self) -> Result<ValidatedPaymentRequest, BillingError> {
        let client_id = required(&self.client_id, "client_id")?;
        let invoice_id = required(&self.invoice_id, "invoice_id")?;
        let payment_method_id = required(&self.payment_method_id, "payment_method_id")?;
        let amount = self
            .amount
            .ok_or_else(|| BillingError::invalid_request("missing required field: amount"))?;

        let client_id = ClientId::from_str(client_id)
            .map_err(|_| BillingError::invalid_request(format!("malformed client_id: {}", client_id)))?;
        let invoice_id = InvoiceId::from_str(invoice_id)
            .map_err(|_| BillingError::invalid_request(format!("malformed invoice_id: {}", invoice_id)))?;

        if amount <= Decimal::ZERO {
            return Err(BillingError::invalid_request("amount must be greater than zero"));
        }

        Ok(ValidatedPaymentRequest {
            client_id,
            invoice_id,
            amount,
            payment_method_id: payment_method_id.to_string(),
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, BillingError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BillingError::invalid_request(format!("missing required field: {}", field)))
}

/// Result of a charge that reached a gateway verdict
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// The charge was captured and the invoice reconciled
    Succeeded { payment: Payment, invoice: Invoice },
    /// The gateway did not capture the charge; the invoice is unchanged
    Failed {
        payment: Payment,
        gateway_status: GatewayStatus,
    },
}

impl PaymentOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            PaymentOutcome::Succeeded { payment, .. } | PaymentOutcome::Failed { payment, .. } => {
                payment
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PaymentOutcome::Succeeded { .. })
    }
}

/// Orchestrates the payment workflow over the billing ports
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    staff: Arc<dyn StaffDirectory>,
    templates: EmailTemplates,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        staff: Arc<dyn StaffDirectory>,
        templates: EmailTemplates,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            staff,
            templates,
        }
    }

    /// Charges `amount` against the invoice and reconciles the result
    #[instrument(
        skip(self, request),
        fields(invoice_id = tracing::field::Empty, attempt = tracing::field::Empty, gateway_status = tracing::field::Empty)
    )]
    pub async fn process_payment(
        &self,
        request: ProcessPaymentRequest,
    ) -> Result<PaymentOutcome, BillingError> {
        let input = request.validate()?;
        let span = tracing::Span::current();
        span.record("invoice_id", tracing::field::display(input.invoice_id));

        let client = self.store.get_client(input.client_id).await?;
        let invoice = self.store.get_invoice(input.invoice_id).await?;

        if invoice.client_id != client.id {
            return Err(BillingError::invalid_request(format!(
                "invoice {} does not belong to client {}",
                invoice.invoice_number, client.id
            )));
        }

        if input.amount.round_dp(invoice.currency.decimal_places()) != input.amount {
            return Err(BillingError::invalid_request(format!(
                "amount {} has more precision than {} allows",
                input.amount, invoice.currency
            )));
        }
        let amount = Money::new(input.amount, invoice.currency);
        check_chargeable(&invoice, &amount)?;

        let attempt_number = self.store.count_attempts(invoice.id).await? + 1;
        let idempotency_key = IdempotencyKey::for_attempt(invoice.id, attempt_number);
        span.record("attempt", attempt_number);

        let charge = ChargeRequest {
            amount,
            payment_method_id: input.payment_method_id,
            idempotency_key: idempotency_key.clone(),
            invoice_id: invoice.id,
            client_id: client.id,
            attempt_number,
            description: format!("{} invoice {}", self.templates.agency_name(), invoice.invoice_number),
            receipt_email: client.contact_email().map(str::to_string),
        };

        let outcome = self.gateway.create_charge(&charge).await.map_err(|e| {
            warn!(error = %e, "Gateway gave no verdict; nothing recorded");
            match e {
                PortError::Conflict { message } => BillingError::Conflict(message),
                other => BillingError::Gateway(other),
            }
        })?;
        span.record("gateway_status", outcome.status.as_str());

        let attempt = PaymentAttempt {
            invoice_id: invoice.id,
            client_id: client.id,
            amount,
            attempt_number,
            idempotency_key,
        };

        if outcome.status.is_succeeded() {
            self.settle(attempt, outcome, client, invoice).await
        } else {
            self.record_failure(attempt, outcome, client, invoice).await
        }
    }

    async fn settle(
        &self,
        attempt: PaymentAttempt,
        outcome: ChargeOutcome,
        client: Client,
        invoice: Invoice,
    ) -> Result<PaymentOutcome, BillingError> {
        let payment = Payment::completed(attempt, outcome.method, outcome.reference);
        let mut current = invoice;

        for _ in 0..=MAX_SETTLEMENT_RETRIES {
            let settlement = reconcile(&current, &payment.amount)?;
            if settlement.balance_due.is_negative() {
                warn!(
                    invoice = %current.invoice_number,
                    balance_due = %settlement.balance_due,
                    "Captured charge exceeds the remaining balance"
                );
            }
            let mut updated = current.clone();
            updated.apply_settlement(&settlement, Utc::now());

            match self.store.record_settlement(&payment, &updated).await {
                Ok(stored) => {
                    info!(
                        payment_id = %payment.id,
                        amount = %payment.amount,
                        balance_due = %stored.balance_due,
                        status = stored.status.as_str(),
                        "Payment settled"
                    );
                    self.send_receipt(&client, &stored, &payment).await;
                    return Ok(PaymentOutcome::Succeeded {
                        payment,
                        invoice: stored,
                    });
                }
                Err(PortError::Conflict { message }) => {
                    match self.store.find_payment_by_key(&payment.idempotency_key).await {
                        Ok(Some(existing)) => {
                            warn!(
                                existing_payment = %existing.id,
                                "Charge already recorded by a concurrent request"
                            );
                            return Err(BillingError::Conflict(message));
                        }
                        Ok(None) => {
                            debug!(reason = %message, "Invoice changed during settlement; reconciling again");
                        }
                        Err(e) => {
                            error!(
                                error = %e,
                                idempotency_key = %payment.idempotency_key,
                                "Cannot determine whether captured charge was recorded"
                            );
                            return Err(BillingError::Internal(
                                "payment state could not be confirmed".to_string(),
                            ));
                        }
                    }
                    current = match self.store.get_invoice(current.id).await {
                        Ok(invoice) => invoice,
                        Err(e) => return Err(self.compensate(&payment, e).await),
                    };
                }
                Err(e) => return self.resolve_unacknowledged(&client, payment, e).await,
            }
        }

        Err(self
            .compensate(
                &payment,
                PortError::conflict("invoice kept changing during settlement"),
            )
            .await)
    }

    /// Settles the outcome of a write whose commit was never acknowledged
    ///
    /// The transaction may have committed before the error surfaced, so the
    /// charge is refunded only once the payment is confirmed absent.
    async fn resolve_unacknowledged(
        &self,
        client: &Client,
        payment: Payment,
        cause: PortError,
    ) -> Result<PaymentOutcome, BillingError> {
        match self.store.find_payment_by_key(&payment.idempotency_key).await {
            Ok(Some(recorded)) => {
                warn!(
                    error = %cause,
                    payment_id = %recorded.id,
                    "Settlement committed despite store error"
                );
                let invoice = self.store.get_invoice(recorded.invoice_id).await.map_err(|e| {
                    error!(error = %e, payment_id = %recorded.id, "Recorded payment but cannot reload invoice");
                    BillingError::Internal("payment recorded; invoice could not be reloaded".to_string())
                })?;
                self.send_receipt(client, &invoice, &recorded).await;
                Ok(PaymentOutcome::Succeeded {
                    payment: recorded,
                    invoice,
                })
            }
            Ok(None) => Err(self.compensate(&payment, cause).await),
            Err(e) => {
                error!(
                    error = %e,
                    cause = %cause,
                    idempotency_key = %payment.idempotency_key,
                    reference = ?payment.gateway_reference,
                    "Cannot determine whether captured charge was recorded; not refunding"
                );
                Err(BillingError::Internal(
                    "payment state could not be confirmed".to_string(),
                ))
            }
        }
    }

    /// Reverses a captured charge that could not be recorded
    async fn compensate(&self, payment: &Payment, cause: PortError) -> BillingError {
        error!(
            error = %cause,
            payment_id = %payment.id,
            idempotency_key = %payment.idempotency_key,
            "Settlement failed after capture; refunding charge"
        );

        match &payment.gateway_reference {
            Some(reference) => {
                let refund_key = payment.idempotency_key.for_refund();
                if let Err(e) = self.gateway.refund_charge(reference, &refund_key).await {
                    error!(
                        error = %e,
                        reference = %reference,
                        "Refund failed; charge captured without a payment record"
                    );
                }
            }
            None => error!("Captured charge has no gateway reference; cannot refund"),
        }

        BillingError::Internal("payment could not be recorded".to_string())
    }

    async fn record_failure(
        &self,
        attempt: PaymentAttempt,
        outcome: ChargeOutcome,
        client: Client,
        invoice: Invoice,
    ) -> Result<PaymentOutcome, BillingError> {
        let payment = Payment::failed(
            attempt,
            outcome.method,
            outcome.status.clone(),
            outcome.reference,
            outcome.failure_message.as_deref(),
        );

        self.store.record_failed_attempt(&payment).await?;
        warn!(
            payment_id = %payment.id,
            gateway_status = %payment.gateway_status,
            "Payment attempt failed"
        );

        self.alert_admins(&client, &invoice, &payment).await;

        Ok(PaymentOutcome::Failed {
            gateway_status: outcome.status,
            payment,
        })
    }

    async fn send_receipt(&self, client: &Client, invoice: &Invoice, payment: &Payment) {
        let Some(to) = client.contact_email() else {
            debug!(client_id = %client.id, "Client has no email; receipt skipped");
            return;
        };
        let message = self.templates.payment_receipt(to, client, invoice, payment);
        if let Err(e) = self.notifier.send(&message).await {
            warn!(error = %e, client_id = %client.id, "Failed to send payment receipt");
        }
    }

    async fn alert_admins(&self, client: &Client, invoice: &Invoice, payment: &Payment) {
        let admins = match self.staff.users_with_role(Role::Admin).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!(error = %e, "Failed to look up admins for payment alert");
                return;
            }
        };
        if admins.is_empty() {
            warn!("No admin users to alert about failed payment");
        }

        for admin in admins {
            let message = self
                .templates
                .payment_failed_alert(&admin.email, client, invoice, payment);
            if let Err(e) = self.notifier.send(&message).await {
                warn!(error = %e, admin = %admin.id, "Failed to send payment alert");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{InvoiceItem, InvoiceStatus, ServiceType};
    use crate::payment::{PaymentMethod, PaymentStatus};
    use crate::ports::mock::{MockBillingStore, MockNotifier, MockPaymentGateway, MockStaffDirectory};
    use crate::ports::StaffUser;
    use chrono::NaiveDate;
    use core_kernel::{Currency, Timezone, UserId};
    use rust_decimal_macros::dec;

    struct Harness {
        service: PaymentService,
        store: Arc<MockBillingStore>,
        gateway: Arc<MockPaymentGateway>,
        notifier: Arc<MockNotifier>,
        client: Client,
        invoice: Invoice,
    }

    impl Harness {
        fn request(&self, amount: Decimal) -> ProcessPaymentRequest {
            ProcessPaymentRequest::new(self.client.id, self.invoice.id, amount, "pm_card_visa")
        }

        async fn stored_invoice(&self) -> Invoice {
            self.store.get_invoice(self.invoice.id).await.unwrap()
        }
    }

    fn staff(name: &str, role: Role) -> StaffUser {
        StaffUser {
            id: UserId::new(),
            full_name: name.to_string(),
            email: format!("{}@agency.example", name.to_lowercase()),
            role,
        }
    }

    async fn harness(total: Decimal) -> Harness {
        let store = Arc::new(MockBillingStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let notifier = Arc::new(MockNotifier::new());
        let directory = Arc::new(MockStaffDirectory::with_users(vec![
            staff("Alice", Role::Admin),
            staff("Bob", Role::Admin),
            staff("Carol", Role::Caregiver),
        ]));

        let client = Client::new("Margaret Lee").with_email("margaret@example.com");
        let issue = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let due = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let mut invoice = Invoice::new(client.id, issue, due, Currency::USD)
            .with_item(InvoiceItem::new(
                "Personal care, March",
                ServiceType::PersonalCare,
                Money::new(total, Currency::USD),
            ))
            .unwrap();
        invoice.mark_sent(Utc::now());

        store.insert_client(client.clone()).await;
        store.insert_invoice(invoice.clone()).await;

        let service = PaymentService::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            directory,
            EmailTemplates::new("Sunrise Home Care", Timezone::default()),
        );

        Harness {
            service,
            store,
            gateway,
            notifier,
            client,
            invoice,
        }
    }

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    #[tokio::test]
    async fn test_partial_payment_reconciles_invoice() {
        let h = harness(dec!(400)).await;

        let outcome = h.service.process_payment(h.request(dec!(150))).await.unwrap();
        let PaymentOutcome::Succeeded { payment, invoice } = outcome else {
            panic!("expected success");
        };

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(invoice.amount_paid, usd(dec!(150)));
        assert_eq!(invoice.balance_due, usd(dec!(250)));
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(h.stored_invoice().await, invoice);

        let requests = h.gateway.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, usd(dec!(150)));
        assert_eq!(requests[0].idempotency_key, IdempotencyKey::for_attempt(h.invoice.id, 1));

        let receipts = h.notifier.sent_to("margaret@example.com").await;
        assert_eq!(receipts.len(), 1);
        assert!(receipts[0].body.contains("$250.00"));
    }

    #[tokio::test]
    async fn test_full_payment_marks_invoice_paid() {
        let h = harness(dec!(400)).await;

        let outcome = h.service.process_payment(h.request(dec!(400))).await.unwrap();
        let PaymentOutcome::Succeeded { invoice, .. } = outcome else {
            panic!("expected success");
        };

        assert!(invoice.balance_due.is_zero());
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_successive_payments_settle_invoice() {
        let h = harness(dec!(300)).await;

        h.service.process_payment(h.request(dec!(100))).await.unwrap();
        h.service.process_payment(h.request(dec!(200))).await.unwrap();

        let invoice = h.stored_invoice().await;
        assert_eq!(invoice.amount_paid, usd(dec!(300)));
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        let keys: Vec<_> = h.store.payments().await.into_iter().map(|p| p.attempt_number).collect();
        assert_eq!(keys, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_decline_records_failure_and_alerts_admins() {
        let h = harness(dec!(400)).await;
        h.gateway
            .push_response(Ok(ChargeOutcome::declined(
                Some("pi_declined".to_string()),
                "Your card has insufficient funds.",
            )))
            .await;

        let outcome = h.service.process_payment(h.request(dec!(100))).await.unwrap();
        let PaymentOutcome::Failed { payment, gateway_status } = outcome else {
            panic!("expected failure");
        };

        assert_eq!(gateway_status, GatewayStatus::Declined);
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.notes.as_deref().unwrap().contains("declined"));
        assert_eq!(h.stored_invoice().await, h.invoice);
        assert_eq!(h.store.payments().await.len(), 1);

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.to.ends_with("@agency.example")));
        assert!(h.notifier.sent_to("carol@agency.example").await.is_empty());
        assert!(h.notifier.sent_to("margaret@example.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_failure() {
        let h = harness(dec!(400)).await;
        h.gateway
            .push_response(Ok(ChargeOutcome {
                status: GatewayStatus::RequiresAction,
                reference: Some("pi_3ds".to_string()),
                method: PaymentMethod::Card,
                failure_message: None,
            }))
            .await;

        let outcome = h.service.process_payment(h.request(dec!(100))).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.payment().notes.as_deref(), Some("Gateway status: requires_action"));
        assert_eq!(h.stored_invoice().await.amount_paid, usd(dec!(0)));
    }

    #[tokio::test]
    async fn test_missing_fields_never_reach_gateway() {
        let h = harness(dec!(400)).await;
        let complete = h.request(dec!(50));

        let mut cases = Vec::new();
        cases.push(ProcessPaymentRequest { client_id: None, ..complete.clone() });
        cases.push(ProcessPaymentRequest { invoice_id: None, ..complete.clone() });
        cases.push(ProcessPaymentRequest { amount: None, ..complete.clone() });
        cases.push(ProcessPaymentRequest { payment_method_id: Some("  ".to_string()), ..complete.clone() });
        cases.push(ProcessPaymentRequest { invoice_id: Some("not-a-uuid".to_string()), ..complete.clone() });

        for request in cases {
            let err = h.service.process_payment(request).await.unwrap_err();
            assert!(matches!(err, BillingError::InvalidRequest(_)), "got {err:?}");
        }
        assert!(h.gateway.requests().await.is_empty());
        assert!(h.store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amounts_never_reach_gateway() {
        let h = harness(dec!(400)).await;

        for amount in [dec!(0), dec!(-10), dec!(400.01), dec!(10.005)] {
            let err = h.service.process_payment(h.request(amount)).await.unwrap_err();
            assert!(matches!(err, BillingError::InvalidRequest(_)), "amount {amount}: {err:?}");
        }
        assert!(h.gateway.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let h = harness(dec!(400)).await;
        let request = ProcessPaymentRequest::new(h.client.id, InvoiceId::new(), dec!(10), "pm_card_visa");

        let err = h.service.process_payment(request).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound { entity: "Invoice", .. }));
        assert!(h.gateway.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_invoice_of_other_client_is_rejected() {
        let h = harness(dec!(400)).await;
        let other = Client::new("Someone Else");
        h.store.insert_client(other.clone()).await;

        let request = ProcessPaymentRequest::new(other.id, h.invoice.id, dec!(10), "pm_card_visa");
        let err = h.service.process_payment(request).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidRequest(_)));
        assert!(h.gateway.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_invoice_is_rejected() {
        let h = harness(dec!(400)).await;
        let mut cancelled = h.invoice.clone();
        cancelled.cancel().unwrap();
        h.store.insert_invoice(cancelled).await;

        let err = h.service.process_payment(h.request(dec!(10))).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_records_nothing_and_retry_reuses_key() {
        let h = harness(dec!(400)).await;
        h.gateway
            .push_response(Err(PortError::Timeout {
                operation: "create_charge".to_string(),
                duration_ms: 30_000,
            }))
            .await;

        let err = h.service.process_payment(h.request(dec!(100))).await.unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));
        assert!(h.store.payments().await.is_empty());
        assert_eq!(h.stored_invoice().await, h.invoice);

        h.service.process_payment(h.request(dec!(100))).await.unwrap();

        let requests = h.gateway.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].idempotency_key, requests[1].idempotency_key);
        assert_eq!(h.gateway.charge_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_advances_attempt_number() {
        let h = harness(dec!(400)).await;
        h.gateway
            .push_response(Ok(ChargeOutcome::declined(None, "card_declined")))
            .await;

        h.service.process_payment(h.request(dec!(100))).await.unwrap();
        h.service.process_payment(h.request(dec!(100))).await.unwrap();

        let requests = h.gateway.requests().await;
        assert_eq!(requests[0].idempotency_key, IdempotencyKey::for_attempt(h.invoice.id, 1));
        assert_eq!(requests[1].idempotency_key, IdempotencyKey::for_attempt(h.invoice.id, 2));

        let payments = h.store.payments().await;
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(payments[1].status, PaymentStatus::Completed);
        assert_eq!(h.stored_invoice().await.amount_paid, usd(dec!(100)));
    }

    #[tokio::test]
    async fn test_concurrent_edit_is_reconciled_again() {
        let h = harness(dec!(400)).await;
        h.store.simulate_concurrent_edits(1);

        let outcome = h.service.process_payment(h.request(dec!(100))).await.unwrap();
        assert!(outcome.is_success());

        let invoice = h.stored_invoice().await;
        assert_eq!(invoice.amount_paid, usd(dec!(100)));
        assert_eq!(invoice.version, h.invoice.version + 2);
        assert_eq!(h.store.payments().await.len(), 1);
        assert!(h.gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_after_capture_refunds_charge() {
        let h = harness(dec!(400)).await;
        h.gateway
            .push_response(Ok(ChargeOutcome::succeeded("pi_captured", PaymentMethod::Card)))
            .await;
        h.store.fail_writes(true);

        let err = h.service.process_payment(h.request(dec!(100))).await.unwrap_err();
        assert!(matches!(err, BillingError::Internal(_)));
        assert_eq!(h.gateway.refunds().await, vec!["pi_captured".to_string()]);
        assert!(h.store.payments().await.is_empty());
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_commit_ack_keeps_recorded_charge() {
        let h = harness(dec!(400)).await;
        h.gateway
            .push_response(Ok(ChargeOutcome::succeeded("pi_captured", PaymentMethod::Card)))
            .await;
        h.store.drop_acks(true);

        let outcome = h.service.process_payment(h.request(dec!(400))).await.unwrap();
        let PaymentOutcome::Succeeded { payment, invoice } = outcome else {
            panic!("expected success");
        };

        assert!(h.gateway.refunds().await.is_empty());
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(h.stored_invoice().await, invoice);

        let payments = h.store.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].id, payment.id);
        assert_eq!(payments[0].status, PaymentStatus::Completed);
        assert_eq!(h.notifier.sent_to("margaret@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn test_amount_finer_than_currency_is_rejected() {
        let h = harness(dec!(400)).await;

        let err = h.service.process_payment(h.request(dec!(10.00004))).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidRequest(_)), "got {err:?}");
        assert!(h.gateway.requests().await.is_empty());
        assert!(h.store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_payment() {
        let h = harness(dec!(400)).await;
        h.notifier.fail_sends(true);

        let outcome = h.service.process_payment(h.request(dec!(100))).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(h.stored_invoice().await.balance_due, usd(dec!(300)));
    }

    #[test]
    fn test_validate_accepts_prefixed_ids() {
        let client_id = ClientId::new();
        let invoice_id = InvoiceId::new();
        let request = ProcessPaymentRequest::new(client_id, invoice_id, dec!(12.34), "pm_1");

        let validated = request.validate().unwrap();
        assert_eq!(validated.client_id, client_id);
        assert_eq!(validated.invoice_id, invoice_id);
        assert_eq!(validated.amount, dec!(12.34));
    }
}
