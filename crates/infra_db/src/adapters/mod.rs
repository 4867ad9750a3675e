//! Database Adapters
//!
//! PostgreSQL implementations of the domain ports.
//!
//! | Port | Adapter |
//! |------|---------|
//! | `BillingStore` | [`PostgresBillingStore`] |
//! | `StaffDirectory` | [`PostgresStaffDirectory`] |
//! | `VisitNoteStore` | [`PostgresVisitNoteStore`] |

pub mod billing;
pub mod visit_notes;

pub use billing::{PostgresBillingStore, PostgresStaffDirectory};
pub use visit_notes::PostgresVisitNoteStore;

use chrono::Utc;
use sqlx::PgPool;

use core_kernel::{AdapterHealth, HealthCheckResult};

/// Runs `SELECT 1` and reports the latency
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(_) => (AdapterHealth::Healthy, None),
        Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
    };

    HealthCheckResult {
        adapter_id: adapter_id.to_string(),
        status,
        latency_ms,
        message,
        checked_at: Utc::now(),
    }
}
