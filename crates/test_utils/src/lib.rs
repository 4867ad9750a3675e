//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! home care backend test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common entities
//! - `builders`: Builder patterns for invoices and visit notes
//! - `database`: PostgreSQL test containers with the schema migrated
//! - `assertions`: Custom assertion helpers for billing invariants
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
