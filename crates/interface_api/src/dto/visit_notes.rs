//! Visit note DTOs
//!
//! Submissions deserialize straight into `domain_care::VisitNoteInput`;
//! notes and drafts serialize as their domain types.

use serde::Deserialize;
use uuid::Uuid;

/// `?client_id=` selector for the draft endpoints
#[derive(Debug, Deserialize)]
pub struct DraftQuery {
    pub client_id: Uuid,
}

/// `?client_id=&limit=` for note history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub client_id: Uuid,
    pub limit: Option<u32>,
}
