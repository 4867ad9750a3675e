//! Care Domain - Caregiver Visit Documentation
//!
//! Caregivers record each visit with the tasks performed, the client's
//! condition and optional vitals. Submitted notes are validated server-side;
//! partially completed forms are kept as drafts (one per caregiver and
//! client) so work survives a closed browser tab.

pub mod error;
pub mod ports;
pub mod service;
pub mod visit_note;

pub use error::CareError;
pub use ports::VisitNoteStore;
pub use service::VisitNoteService;
pub use visit_note::{VisitNote, VisitNoteDraft, VisitNoteInput, VisitNoteStatus, Vitals};
