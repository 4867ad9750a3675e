//! Repository implementations
//!
//! Repositories speak in row types and `DatabaseError`; the adapters in
//! [`crate::adapters`] map them onto the domain ports.

pub mod billing;
pub mod visit_notes;

pub use billing::BillingRepository;
pub use visit_notes::VisitNoteRepository;
