//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the agency backend using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: [`repositories`] hold the SQL
//! and row types, [`adapters`] implement the domain ports on top of them.
//! Domain crates never see SQLx types.
//!
//! # Consistency
//!
//! A successful payment is written in one transaction that locks the invoice
//! row, checks its version, inserts the payment and updates the totals. The
//! `payments.idempotency_key` unique constraint guarantees at most one record
//! per gateway charge.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/homecare")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PostgresBillingStore, PostgresStaffDirectory, PostgresVisitNoteStore};
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
