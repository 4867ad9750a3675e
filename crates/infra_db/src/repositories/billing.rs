//! Billing repository implementation
//!
//! Database access for clients, invoices, invoice items, payments and the
//! staff directory. Row types mirror the tables; conversion to domain types
//! happens in the adapters.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DatabaseError;

const INVOICE_COLUMNS: &str = r#"
    invoice_id, invoice_number, client_id, currency, total_amount, amount_paid,
    balance_due, status, issue_date, due_date, notes, version, sent_at,
    created_at, updated_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    payment_id, invoice_id, client_id, amount, currency, method, status,
    attempt_number, idempotency_key, gateway_reference, gateway_status, notes,
    payment_date, created_at
"#;

/// Repository for the billing tables
///
/// All multi-statement writes run inside a single transaction.
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    /// Creates a new BillingRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    pub async fn get_client(&self, client_id: Uuid) -> Result<ClientRow, DatabaseError> {
        sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT client_id, full_name, email, phone, billing_address, is_active,
                   created_at, updated_at
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Client", client_id))
    }

    /// Inserts or updates a client record
    pub async fn upsert_client(&self, row: &ClientRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO clients (
                client_id, full_name, email, phone, billing_address, is_active,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (client_id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                billing_address = EXCLUDED.billing_address,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.client_id)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.billing_address)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))
    }

    /// Line items in the order they were added
    pub async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItemRow>, DatabaseError> {
        let items = sqlx::query_as::<_, InvoiceItemRow>(
            r#"
            SELECT item_id, invoice_id, line_number, description, service_type,
                   service_date, quantity, unit_price
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY line_number
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Inserts an invoice with its items in a single transaction
    pub async fn insert_invoice(
        &self,
        invoice: &InvoiceRow,
        items: &[InvoiceItemRow],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, invoice_number, client_id, currency, total_amount,
                amount_paid, balance_due, status, issue_date, due_date, notes,
                version, sent_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.client_id)
        .bind(&invoice.currency)
        .bind(invoice.total_amount)
        .bind(invoice.amount_paid)
        .bind(invoice.balance_due)
        .bind(&invoice.status)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(&invoice.notes)
        .bind(invoice.version)
        .bind(invoice.sent_at)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (
                    item_id, invoice_id, line_number, description, service_type,
                    service_date, quantity, unit_price
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.item_id)
            .bind(item.invoice_id)
            .bind(item.line_number)
            .bind(&item.description)
            .bind(&item.service_type)
            .bind(item.service_date)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Sets `sent_at` and moves a draft to `sent`
    pub async fn mark_invoice_sent(
        &self,
        invoice_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            UPDATE invoices SET
                status = CASE WHEN status = 'draft' THEN 'sent' ELSE status END,
                sent_at = $2,
                updated_at = $2,
                version = version + 1
            WHERE invoice_id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(sent_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    pub async fn list_payments(&self, invoice_id: Uuid) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = $1 ORDER BY attempt_number"
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_payments(&self, invoice_id: Uuid) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM payments WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn find_payment_by_key(&self, key: &str) -> Result<Option<PaymentRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_payment(&self, payment: &PaymentRow) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        insert_payment(&mut conn, payment).await
    }

    /// Records a completed payment and the invoice totals it produced
    ///
    /// The invoice row is locked and its version compared with
    /// `expected_version` before anything is written. Returns the new
    /// version.
    pub async fn settle_invoice(
        &self,
        payment: &PaymentRow,
        settlement: &SettlementUpdate,
    ) -> Result<i64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM invoices WHERE invoice_id = $1 FOR UPDATE",
        )
        .bind(settlement.invoice_id)
        .fetch_optional(&mut *tx)
        .await?;

        match current {
            None => return Err(DatabaseError::not_found("Invoice", settlement.invoice_id)),
            Some(version) if version != settlement.expected_version => {
                return Err(DatabaseError::VersionConflict(format!(
                    "invoice {} is at version {}, expected {}",
                    settlement.invoice_id, version, settlement.expected_version
                )));
            }
            Some(_) => {}
        }

        insert_payment(&mut tx, payment).await?;

        let new_version: i64 = sqlx::query_scalar(
            r#"
            UPDATE invoices SET
                amount_paid = $2,
                balance_due = $3,
                status = $4,
                updated_at = $5,
                version = version + 1
            WHERE invoice_id = $1
            RETURNING version
            "#,
        )
        .bind(settlement.invoice_id)
        .bind(settlement.amount_paid)
        .bind(settlement.balance_due)
        .bind(&settlement.status)
        .bind(settlement.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(new_version)
    }

    // ------------------------------------------------------------------
    // Staff
    // ------------------------------------------------------------------

    /// Active users holding `role`
    pub async fn staff_with_role(&self, role: &str) -> Result<Vec<StaffUserRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, StaffUserRow>(
            r#"
            SELECT user_id, full_name, email, role
            FROM staff_users
            WHERE role = $1 AND is_active
            ORDER BY full_name
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_staff_user(&self, row: &StaffUserRow) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO staff_users (user_id, full_name, email, role) VALUES ($1, $2, $3, $4)",
        )
        .bind(row.user_id)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_payment(
    conn: &mut sqlx::PgConnection,
    payment: &PaymentRow,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            payment_id, invoice_id, client_id, amount, currency, method, status,
            attempt_number, idempotency_key, gateway_reference, gateway_status,
            notes, payment_date, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(payment.payment_id)
    .bind(payment.invoice_id)
    .bind(payment.client_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.method)
    .bind(&payment.status)
    .bind(payment.attempt_number)
    .bind(&payment.idempotency_key)
    .bind(&payment.gateway_reference)
    .bind(&payment.gateway_status)
    .bind(&payment.notes)
    .bind(payment.payment_date)
    .bind(payment.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub client_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub client_id: Uuid,
    pub currency: String,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub version: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceItemRow {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub line_number: i32,
    pub description: String,
    pub service_type: String,
    pub service_date: Option<NaiveDate>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub attempt_number: i32,
    pub idempotency_key: String,
    pub gateway_reference: Option<String>,
    pub gateway_status: String,
    pub notes: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StaffUserRow {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: String,
}

/// Invoice columns written by a settlement
#[derive(Debug, Clone)]
pub struct SettlementUpdate {
    pub invoice_id: Uuid,
    pub expected_version: i64,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}
