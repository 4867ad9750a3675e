//! Request/response bodies
//!
//! Identifiers are serialized as bare UUIDs and money as decimal strings in
//! the invoice currency.

pub mod invoices;
pub mod payments;
pub mod visit_notes;
