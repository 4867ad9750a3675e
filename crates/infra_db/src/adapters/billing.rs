//! PostgreSQL billing adapters
//!
//! `PostgresBillingStore` implements [`BillingStore`] and
//! `PostgresStaffDirectory` implements [`StaffDirectory`], both on top of
//! [`BillingRepository`]. Rows are converted to domain types here; a stored
//! value the domain does not recognise is a `PortError::Transformation`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    ClientId, Currency, DomainPort, HealthCheckResult, HealthCheckable, InvoiceId, Money,
    PortError,
};
use domain_billing::{
    BillingStore, Client, GatewayStatus, IdempotencyKey, Invoice, InvoiceItem, InvoiceStatus,
    Payment, PaymentMethod, PaymentStatus, Role, ServiceType, StaffDirectory, StaffUser,
};

use crate::adapters::ping;
use crate::error::DatabaseError;
use crate::repositories::billing::{
    BillingRepository, ClientRow, InvoiceItemRow, InvoiceRow, PaymentRow, SettlementUpdate,
    StaffUserRow,
};

/// PostgreSQL-backed implementation of the `BillingStore` port
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    repository: BillingRepository,
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &BillingRepository {
        &self.repository
    }

    /// Creates or updates a client
    pub async fn save_client(&self, client: &Client) -> Result<(), PortError> {
        self.repository
            .upsert_client(&client_to_row(client))
            .await
            .map_err(PortError::from)
    }

    /// Inserts a new invoice and its line items
    pub async fn create_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        let (row, items) = invoice_to_rows(invoice)?;
        self.repository
            .insert_invoice(&row, &items)
            .await
            .map_err(PortError::from)
    }

    async fn load_invoice(&self, row: InvoiceRow) -> Result<Invoice, PortError> {
        let items = self.repository.get_invoice_items(row.invoice_id).await?;
        Ok(row_to_invoice(row, items)?)
    }
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-billing-store").await
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    #[instrument(skip(self), fields(client_id = %id))]
    async fn get_client(&self, id: ClientId) -> Result<Client, PortError> {
        let row = self.repository.get_client(id.into()).await?;
        Ok(row_to_client(row))
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        let row = self.repository.get_invoice(id.into()).await?;
        self.load_invoice(row).await
    }

    async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>, PortError> {
        let rows = self.repository.list_payments(invoice_id.into()).await?;
        rows.into_iter()
            .map(|row| row_to_payment(row).map_err(PortError::from))
            .collect()
    }

    async fn count_attempts(&self, invoice_id: InvoiceId) -> Result<u32, PortError> {
        let count = self.repository.count_payments(invoice_id.into()).await?;
        u32::try_from(count)
            .map_err(|_| PortError::transformation(format!("attempt count {} out of range", count)))
    }

    async fn find_payment_by_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Payment>, PortError> {
        match self.repository.find_payment_by_key(key.as_str()).await? {
            Some(row) => Ok(Some(row_to_payment(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(
        skip(self, payment, invoice),
        fields(invoice_id = %invoice.id, expected_version = invoice.version)
    )]
    async fn record_settlement(
        &self,
        payment: &Payment,
        invoice: &Invoice,
    ) -> Result<Invoice, PortError> {
        let update = SettlementUpdate {
            invoice_id: invoice.id.into(),
            expected_version: invoice.version,
            amount_paid: invoice.amount_paid.amount(),
            balance_due: invoice.balance_due.amount(),
            status: invoice.status.as_str().to_string(),
            updated_at: invoice.updated_at,
        };

        let version = self
            .repository
            .settle_invoice(&payment_to_row(payment)?, &update)
            .await?;
        debug!(version, "Settlement committed");

        let mut stored = invoice.clone();
        stored.version = version;
        Ok(stored)
    }

    #[instrument(skip(self, payment), fields(key = %payment.idempotency_key))]
    async fn record_failed_attempt(&self, payment: &Payment) -> Result<(), PortError> {
        self.repository
            .insert_payment(&payment_to_row(payment)?)
            .await
            .map_err(PortError::from)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn mark_invoice_sent(
        &self,
        id: InvoiceId,
        sent_at: DateTime<Utc>,
    ) -> Result<Invoice, PortError> {
        let row = self.repository.mark_invoice_sent(id.into(), sent_at).await?;
        self.load_invoice(row).await
    }
}

/// PostgreSQL-backed implementation of the `StaffDirectory` port
#[derive(Debug, Clone)]
pub struct PostgresStaffDirectory {
    repository: BillingRepository,
    pool: PgPool,
}

impl PostgresStaffDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn add_user(&self, user: &StaffUser) -> Result<(), PortError> {
        let row = StaffUserRow {
            user_id: user.id.into(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
        };
        self.repository
            .insert_staff_user(&row)
            .await
            .map_err(PortError::from)
    }
}

impl DomainPort for PostgresStaffDirectory {}

#[async_trait]
impl HealthCheckable for PostgresStaffDirectory {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-staff-directory").await
    }
}

#[async_trait]
impl StaffDirectory for PostgresStaffDirectory {
    async fn users_with_role(&self, role: Role) -> Result<Vec<StaffUser>, PortError> {
        let rows = self.repository.staff_with_role(role.as_str()).await?;
        rows.into_iter()
            .map(|row| {
                let role = Role::parse(&row.role).ok_or_else(|| {
                    PortError::transformation(format!("unknown staff role '{}'", row.role))
                })?;
                Ok(StaffUser {
                    id: row.user_id.into(),
                    full_name: row.full_name,
                    email: row.email,
                    role,
                })
            })
            .collect()
    }
}

// ============================================================================
// Row conversions
// ============================================================================

fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    Currency::from_str(code).map_err(|e| DatabaseError::serialization(e.to_string()))
}

fn row_to_client(row: ClientRow) -> Client {
    Client {
        id: row.client_id.into(),
        full_name: row.full_name,
        email: row.email,
        phone: row.phone,
        billing_address: row.billing_address,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn client_to_row(client: &Client) -> ClientRow {
    ClientRow {
        client_id: client.id.into(),
        full_name: client.full_name.clone(),
        email: client.email.clone(),
        phone: client.phone.clone(),
        billing_address: client.billing_address.clone(),
        is_active: client.is_active,
        created_at: client.created_at,
        updated_at: client.updated_at,
    }
}

fn row_to_invoice(row: InvoiceRow, items: Vec<InvoiceItemRow>) -> Result<Invoice, DatabaseError> {
    let currency = parse_currency(&row.currency)?;
    let status = InvoiceStatus::parse(&row.status).ok_or_else(|| {
        DatabaseError::serialization(format!("unknown invoice status '{}'", row.status))
    })?;

    let items = items
        .into_iter()
        .map(|item| InvoiceItem {
            id: item.item_id,
            description: item.description,
            service_type: ServiceType::parse(&item.service_type),
            service_date: item.service_date,
            quantity: item.quantity,
            unit_price: Money::new(item.unit_price, currency),
        })
        .collect();

    Ok(Invoice {
        id: row.invoice_id.into(),
        invoice_number: row.invoice_number,
        client_id: row.client_id.into(),
        currency,
        items,
        total_amount: Money::new(row.total_amount, currency),
        amount_paid: Money::new(row.amount_paid, currency),
        balance_due: Money::new(row.balance_due, currency),
        status,
        issue_date: row.issue_date,
        due_date: row.due_date,
        notes: row.notes,
        version: row.version,
        sent_at: row.sent_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn invoice_to_rows(invoice: &Invoice) -> Result<(InvoiceRow, Vec<InvoiceItemRow>), PortError> {
    let invoice_id = invoice.id.into();
    let items = invoice
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let line_number = i32::try_from(index + 1)
                .map_err(|_| PortError::validation("too many invoice items"))?;
            Ok(InvoiceItemRow {
                item_id: item.id,
                invoice_id,
                line_number,
                description: item.description.clone(),
                service_type: item.service_type.as_str().to_string(),
                service_date: item.service_date,
                quantity: item.quantity,
                unit_price: item.unit_price.amount(),
            })
        })
        .collect::<Result<Vec<_>, PortError>>()?;

    let row = InvoiceRow {
        invoice_id,
        invoice_number: invoice.invoice_number.clone(),
        client_id: invoice.client_id.into(),
        currency: invoice.currency.code().to_string(),
        total_amount: invoice.total_amount.amount(),
        amount_paid: invoice.amount_paid.amount(),
        balance_due: invoice.balance_due.amount(),
        status: invoice.status.as_str().to_string(),
        issue_date: invoice.issue_date,
        due_date: invoice.due_date,
        notes: invoice.notes.clone(),
        version: invoice.version,
        sent_at: invoice.sent_at,
        created_at: invoice.created_at,
        updated_at: invoice.updated_at,
    };
    Ok((row, items))
}

fn row_to_payment(row: PaymentRow) -> Result<Payment, DatabaseError> {
    let currency = parse_currency(&row.currency)?;
    let status = PaymentStatus::parse(&row.status).ok_or_else(|| {
        DatabaseError::serialization(format!("unknown payment status '{}'", row.status))
    })?;
    let attempt_number = u32::try_from(row.attempt_number).map_err(|_| {
        DatabaseError::serialization(format!("invalid attempt number {}", row.attempt_number))
    })?;

    Ok(Payment {
        id: row.payment_id.into(),
        invoice_id: row.invoice_id.into(),
        client_id: row.client_id.into(),
        amount: Money::new(row.amount, currency),
        method: PaymentMethod::parse(&row.method),
        status,
        attempt_number,
        idempotency_key: IdempotencyKey::from_stored(row.idempotency_key),
        gateway_reference: row.gateway_reference,
        gateway_status: GatewayStatus::from(row.gateway_status),
        notes: row.notes,
        payment_date: row.payment_date,
        created_at: row.created_at,
    })
}

fn payment_to_row(payment: &Payment) -> Result<PaymentRow, PortError> {
    let attempt_number = i32::try_from(payment.attempt_number)
        .map_err(|_| PortError::validation_field("attempt number out of range", "attempt_number"))?;

    Ok(PaymentRow {
        payment_id: payment.id.into(),
        invoice_id: payment.invoice_id.into(),
        client_id: payment.client_id.into(),
        amount: payment.amount.amount(),
        currency: payment.amount.currency().code().to_string(),
        method: payment.method.as_str().to_string(),
        status: payment.status.as_str().to_string(),
        attempt_number,
        idempotency_key: payment.idempotency_key.as_str().to_string(),
        gateway_reference: payment.gateway_reference.clone(),
        gateway_status: payment.gateway_status.as_str().to_string(),
        notes: payment.notes.clone(),
        payment_date: payment.payment_date,
        created_at: payment.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn invoice_row(status: &str) -> InvoiceRow {
        let now = Utc::now();
        InvoiceRow {
            invoice_id: Uuid::new_v4(),
            invoice_number: "INV-202504-ABC123".to_string(),
            client_id: Uuid::new_v4(),
            currency: "USD".to_string(),
            total_amount: dec!(200.00),
            amount_paid: dec!(50.00),
            balance_due: dec!(150.00),
            status: status.to_string(),
            issue_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
            notes: None,
            version: 3,
            sent_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_invoice_row_conversion() {
        let row = invoice_row("sent");
        let item = InvoiceItemRow {
            item_id: Uuid::new_v4(),
            invoice_id: row.invoice_id,
            line_number: 1,
            description: "Personal care".to_string(),
            service_type: "personal_care".to_string(),
            service_date: None,
            quantity: dec!(4),
            unit_price: dec!(50.00),
        };

        let invoice = row_to_invoice(row, vec![item]).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.balance_due, Money::new(dec!(150.00), Currency::USD));
        assert_eq!(invoice.items[0].service_type, ServiceType::PersonalCare);
        assert_eq!(invoice.version, 3);

        let (back, items) = invoice_to_rows(&invoice).unwrap();
        assert_eq!(back.status, "sent");
        assert_eq!(items[0].line_number, 1);
    }

    #[test]
    fn test_unknown_status_is_serialization_error() {
        let err = row_to_invoice(invoice_row("refunded"), Vec::new()).unwrap_err();
        assert!(matches!(
            PortError::from(err),
            PortError::Transformation { .. }
        ));
    }

    #[test]
    fn test_payment_row_round_trip_keeps_key() {
        let now = Utc::now();
        let row = PaymentRow {
            payment_id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            amount: dec!(80.00),
            currency: "USD".to_string(),
            method: "card".to_string(),
            status: "failed".to_string(),
            attempt_number: 2,
            idempotency_key: "invoice-abc-attempt-2".to_string(),
            gateway_reference: Some("pi_123".to_string()),
            gateway_status: "requires_payment_method".to_string(),
            notes: Some("Gateway status: requires_payment_method".to_string()),
            payment_date: now,
            created_at: now,
        };

        let payment = row_to_payment(row).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.gateway_status, GatewayStatus::RequiresPaymentMethod);
        assert_eq!(payment.attempt_number, 2);

        let back = payment_to_row(&payment).unwrap();
        assert_eq!(back.idempotency_key, "invoice-abc-attempt-2");
        assert_eq!(back.gateway_status, "requires_payment_method");
    }
}
