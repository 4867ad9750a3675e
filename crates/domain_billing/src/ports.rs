//! Billing Domain Ports
//!
//! The payment workflow talks to four collaborators, each behind a trait:
//!
//! - **`BillingStore`**: the entity store holding clients, invoices and
//!   payments. Implemented by `infra_db::PostgresBillingStore`.
//! - **`PaymentGateway`**: the processor that moves funds. Implemented by
//!   [`crate::adapters::StripeGateway`].
//! - **`Notifier`**: outbound email. Implemented by
//!   [`crate::adapters::HttpEmailNotifier`].
//! - **`StaffDirectory`**: agency users and their roles, used to find the
//!   admins to alert. Implemented by `infra_db::PostgresStaffDirectory`.
//!
//! In-memory versions of all four live in [`mock`].
//!
//! ```rust,ignore
//! let service = PaymentService::new(
//!     Arc::new(PostgresBillingStore::new(pool.clone())),
//!     Arc::new(StripeGateway::new(stripe_config)?),
//!     Arc::new(HttpEmailNotifier::new(email_config)?),
//!     Arc::new(PostgresStaffDirectory::new(pool)),
//!     EmailTemplates::new("Sunrise Home Care", timezone),
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    ClientId, DomainPort, HealthCheckable, InvoiceId, Money, PortError, UserId,
};

use crate::client::Client;
use crate::idempotency::IdempotencyKey;
use crate::invoice::Invoice;
use crate::payment::{GatewayStatus, Payment, PaymentMethod};

// ============================================================================
// Entity store
// ============================================================================

/// Persistence for clients, invoices and payments
///
/// `record_settlement` is the only way a successful charge reaches storage:
/// the payment insert and the invoice update commit together or not at all.
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    /// Retrieves a client, or `PortError::NotFound`
    async fn get_client(&self, id: ClientId) -> Result<Client, PortError>;

    /// Retrieves an invoice with its items, or `PortError::NotFound`
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// All payments recorded against an invoice, oldest first
    async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>, PortError>;

    /// Number of payments (of any status) recorded against an invoice
    async fn count_attempts(&self, invoice_id: InvoiceId) -> Result<u32, PortError>;

    /// Looks up a payment by the idempotency key of its charge
    async fn find_payment_by_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Payment>, PortError>;

    /// Atomically inserts a completed payment and writes the settled invoice
    ///
    /// `invoice.version` must be the version the caller read; a mismatch or
    /// an already-used idempotency key yields `PortError::Conflict` and
    /// nothing is written. Returns the invoice as stored (new version).
    async fn record_settlement(
        &self,
        payment: &Payment,
        invoice: &Invoice,
    ) -> Result<Invoice, PortError>;

    /// Inserts a failed payment; the invoice is not touched
    async fn record_failed_attempt(&self, payment: &Payment) -> Result<(), PortError>;

    /// Stamps the invoice as emailed, moving drafts to `Sent`
    async fn mark_invoice_sent(
        &self,
        id: InvoiceId,
        sent_at: DateTime<Utc>,
    ) -> Result<Invoice, PortError>;
}

// ============================================================================
// Payment gateway
// ============================================================================

/// A charge submitted to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Money,
    /// Gateway token for the client's saved payment method
    pub payment_method_id: String,
    pub idempotency_key: IdempotencyKey,
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub attempt_number: u32,
    pub description: String,
    pub receipt_email: Option<String>,
}

/// The gateway's verdict on a charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub status: GatewayStatus,
    /// Gateway identifier for the charge, when one was created
    pub reference: Option<String>,
    pub method: PaymentMethod,
    /// Decline reason or other detail from the gateway
    pub failure_message: Option<String>,
}

impl ChargeOutcome {
    pub fn succeeded(reference: impl Into<String>, method: PaymentMethod) -> Self {
        Self {
            status: GatewayStatus::Succeeded,
            reference: Some(reference.into()),
            method,
            failure_message: None,
        }
    }

    pub fn declined(reference: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: GatewayStatus::Declined,
            reference,
            method: PaymentMethod::Card,
            failure_message: Some(message.into()),
        }
    }
}

/// Payment processor
///
/// `create_charge` returns `Ok` whenever the gateway gave a verdict,
/// including declines. `Err` means no verdict was obtained (transport
/// failure, timeout, rate limit) and the same idempotency key may be retried.
#[async_trait]
pub trait PaymentGateway: DomainPort + HealthCheckable {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PortError>;

    /// Refunds a captured charge in full
    async fn refund_charge(
        &self,
        reference: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<(), PortError>;
}

// ============================================================================
// Notifications
// ============================================================================

/// An outbound plain-text email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email delivery
#[async_trait]
pub trait Notifier: DomainPort + HealthCheckable {
    async fn send(&self, message: &EmailMessage) -> Result<(), PortError>;
}

// ============================================================================
// Staff directory
// ============================================================================

/// Agency staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Billing,
    Caregiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Billing => "billing",
            Role::Caregiver => "caregiver",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "billing" => Some(Role::Billing),
            "caregiver" => Some(Role::Caregiver),
            _ => None,
        }
    }
}

/// A portal user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffUser {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

/// Lookup of portal users by role
#[async_trait]
pub trait StaffDirectory: DomainPort + HealthCheckable {
    async fn users_with_role(&self, role: Role) -> Result<Vec<StaffUser>, PortError>;
}

/// In-memory implementations of the billing ports
///
/// Each mock records what it was asked to do and supports failure injection
/// so services can be driven through their error paths.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::{Mutex, RwLock};

    use crate::invoice::InvoiceStatus;

    #[derive(Debug, Default)]
    struct StoreState {
        clients: HashMap<ClientId, Client>,
        invoices: HashMap<InvoiceId, Invoice>,
        payments: Vec<Payment>,
    }

    /// In-memory `BillingStore` with the same atomicity as the database
    #[derive(Debug, Default)]
    pub struct MockBillingStore {
        state: Arc<RwLock<StoreState>>,
        fail_writes: AtomicBool,
        drop_acks: AtomicBool,
        concurrent_edits: AtomicU32,
    }

    impl MockBillingStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_client(&self, client: Client) {
            self.state.write().await.clients.insert(client.id, client);
        }

        pub async fn insert_invoice(&self, invoice: Invoice) {
            self.state.write().await.invoices.insert(invoice.id, invoice);
        }

        /// Snapshot of every recorded payment
        pub async fn payments(&self) -> Vec<Payment> {
            self.state.read().await.payments.clone()
        }

        /// Makes every subsequent write fail with a connection error
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Makes settlements commit but report a connection error, as when
        /// the link drops after `COMMIT`
        pub fn drop_acks(&self, drop: bool) {
            self.drop_acks.store(drop, Ordering::SeqCst);
        }

        /// Simulates `n` edits by other writers landing just before the next
        /// settlements, each one bumping the invoice version
        pub fn simulate_concurrent_edits(&self, n: u32) {
            self.concurrent_edits.store(n, Ordering::SeqCst);
        }

        fn check_writable(&self) -> Result<(), PortError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(PortError::connection("injected store failure"));
            }
            Ok(())
        }
    }

    impl DomainPort for MockBillingStore {}

    #[async_trait]
    impl HealthCheckable for MockBillingStore {
        async fn health_check(&self) -> core_kernel::HealthCheckResult {
            core_kernel::HealthCheckResult::healthy("mock-billing-store")
        }
    }

    #[async_trait]
    impl BillingStore for MockBillingStore {
        async fn get_client(&self, id: ClientId) -> Result<Client, PortError> {
            self.state
                .read()
                .await
                .clients
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Client", id))
        }

        async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
            self.state
                .read()
                .await
                .invoices
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Invoice", id))
        }

        async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .payments
                .iter()
                .filter(|p| p.invoice_id == invoice_id)
                .cloned()
                .collect())
        }

        async fn count_attempts(&self, invoice_id: InvoiceId) -> Result<u32, PortError> {
            let count = self
                .state
                .read()
                .await
                .payments
                .iter()
                .filter(|p| p.invoice_id == invoice_id)
                .count();
            Ok(count as u32)
        }

        async fn find_payment_by_key(
            &self,
            key: &IdempotencyKey,
        ) -> Result<Option<Payment>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .payments
                .iter()
                .find(|p| &p.idempotency_key == key)
                .cloned())
        }

        async fn record_settlement(
            &self,
            payment: &Payment,
            invoice: &Invoice,
        ) -> Result<Invoice, PortError> {
            self.check_writable()?;
            let mut state = self.state.write().await;

            if self.concurrent_edits.load(Ordering::SeqCst) > 0 {
                self.concurrent_edits.fetch_sub(1, Ordering::SeqCst);
                if let Some(stored) = state.invoices.get_mut(&invoice.id) {
                    stored.version += 1;
                }
            }

            if state.payments.iter().any(|p| p.idempotency_key == payment.idempotency_key) {
                return Err(PortError::conflict(format!(
                    "payment already recorded for {}",
                    payment.idempotency_key
                )));
            }

            let stored = state
                .invoices
                .get_mut(&invoice.id)
                .ok_or_else(|| PortError::not_found("Invoice", invoice.id))?;
            if stored.version != invoice.version {
                return Err(PortError::conflict(format!(
                    "invoice {} changed (expected version {}, found {})",
                    invoice.id, invoice.version, stored.version
                )));
            }

            let mut updated = invoice.clone();
            updated.version += 1;
            *stored = updated.clone();
            state.payments.push(payment.clone());
            if self.drop_acks.load(Ordering::SeqCst) {
                return Err(PortError::connection("connection reset after commit"));
            }
            Ok(updated)
        }

        async fn record_failed_attempt(&self, payment: &Payment) -> Result<(), PortError> {
            self.check_writable()?;
            let mut state = self.state.write().await;
            if state.payments.iter().any(|p| p.idempotency_key == payment.idempotency_key) {
                return Err(PortError::conflict(format!(
                    "payment already recorded for {}",
                    payment.idempotency_key
                )));
            }
            state.payments.push(payment.clone());
            Ok(())
        }

        async fn mark_invoice_sent(
            &self,
            id: InvoiceId,
            sent_at: DateTime<Utc>,
        ) -> Result<Invoice, PortError> {
            self.check_writable()?;
            let mut state = self.state.write().await;
            let invoice = state
                .invoices
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("Invoice", id))?;
            invoice.mark_sent(sent_at);
            invoice.version += 1;
            Ok(invoice.clone())
        }
    }

    /// Scripted `PaymentGateway`
    ///
    /// Queued responses are returned in order; with an empty queue every
    /// charge succeeds. Like a real gateway, a repeated idempotency key
    /// returns the original verdict without charging again.
    #[derive(Debug, Default)]
    pub struct MockPaymentGateway {
        script: Mutex<VecDeque<Result<ChargeOutcome, PortError>>>,
        requests: Mutex<Vec<ChargeRequest>>,
        verdicts: Mutex<HashMap<IdempotencyKey, ChargeOutcome>>,
        refunds: Mutex<Vec<String>>,
    }

    impl MockPaymentGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues the response for the next new charge
        pub async fn push_response(&self, response: Result<ChargeOutcome, PortError>) {
            self.script.lock().await.push_back(response);
        }

        /// Every request received, including idempotent replays
        pub async fn requests(&self) -> Vec<ChargeRequest> {
            self.requests.lock().await.clone()
        }

        /// Number of distinct charges the gateway gave a verdict on
        pub async fn charge_count(&self) -> usize {
            self.verdicts.lock().await.len()
        }

        pub async fn refunds(&self) -> Vec<String> {
            self.refunds.lock().await.clone()
        }
    }

    impl DomainPort for MockPaymentGateway {}

    #[async_trait]
    impl HealthCheckable for MockPaymentGateway {
        async fn health_check(&self) -> core_kernel::HealthCheckResult {
            core_kernel::HealthCheckResult::healthy("mock-payment-gateway")
        }
    }

    #[async_trait]
    impl PaymentGateway for MockPaymentGateway {
        async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PortError> {
            self.requests.lock().await.push(request.clone());

            let mut verdicts = self.verdicts.lock().await;
            if let Some(previous) = verdicts.get(&request.idempotency_key) {
                return Ok(previous.clone());
            }

            let response = self.script.lock().await.pop_front().unwrap_or_else(|| {
                Ok(ChargeOutcome::succeeded(
                    format!("pi_mock_{}", verdicts.len() + 1),
                    PaymentMethod::Card,
                ))
            });
            if let Ok(outcome) = &response {
                verdicts.insert(request.idempotency_key.clone(), outcome.clone());
            }
            response
        }

        async fn refund_charge(
            &self,
            reference: &str,
            _idempotency_key: &IdempotencyKey,
        ) -> Result<(), PortError> {
            self.refunds.lock().await.push(reference.to_string());
            Ok(())
        }
    }

    /// `Notifier` that keeps sent messages in memory
    #[derive(Debug, Default)]
    pub struct MockNotifier {
        sent: Mutex<Vec<EmailMessage>>,
        fail: AtomicBool,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_sends(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub async fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().await.clone()
        }

        pub async fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
            self.sent
                .lock()
                .await
                .iter()
                .filter(|m| m.to == address)
                .cloned()
                .collect()
        }
    }

    impl DomainPort for MockNotifier {}

    #[async_trait]
    impl HealthCheckable for MockNotifier {
        async fn health_check(&self) -> core_kernel::HealthCheckResult {
            core_kernel::HealthCheckResult::healthy("mock-notifier")
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, message: &EmailMessage) -> Result<(), PortError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PortError::ServiceUnavailable {
                    service: "mock email relay".to_string(),
                });
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    /// Fixed staff list
    #[derive(Debug, Default)]
    pub struct MockStaffDirectory {
        users: RwLock<Vec<StaffUser>>,
    }

    impl MockStaffDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_users(users: Vec<StaffUser>) -> Self {
            Self {
                users: RwLock::new(users),
            }
        }

        pub async fn add_user(&self, user: StaffUser) {
            self.users.write().await.push(user);
        }
    }

    impl DomainPort for MockStaffDirectory {}

    #[async_trait]
    impl HealthCheckable for MockStaffDirectory {
        async fn health_check(&self) -> core_kernel::HealthCheckResult {
            core_kernel::HealthCheckResult::healthy("mock-staff-directory")
        }
    }

    #[async_trait]
    impl StaffDirectory for MockStaffDirectory {
        async fn users_with_role(&self, role: Role) -> Result<Vec<StaffUser>, PortError> {
            Ok(self
                .users
                .read()
                .await
                .iter()
                .filter(|u| u.role == role)
                .cloned()
                .collect())
        }
    }

}
