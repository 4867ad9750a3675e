//! Visit note submission and draft autosave

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use validator::Validate;

use core_kernel::{CaregiverId, ClientId, Timezone, VisitNoteId};

use crate::error::CareError;
use crate::ports::VisitNoteStore;
use crate::visit_note::{VisitNote, VisitNoteDraft, VisitNoteInput};

/// Upper bound on a serialized draft, in bytes
const MAX_DRAFT_BYTES: usize = 64 * 1024;

/// Default page size for client note history
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct VisitNoteService {
    store: Arc<dyn VisitNoteStore>,
    timezone: Timezone,
}

impl VisitNoteService {
    pub fn new(store: Arc<dyn VisitNoteStore>, timezone: Timezone) -> Self {
        Self { store, timezone }
    }

    /// Validates and stores a note; the matching draft is discarded
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn submit(
        &self,
        caregiver_id: CaregiverId,
        input: VisitNoteInput,
    ) -> Result<VisitNote, CareError> {
        input.validate()?;

        let today = self.timezone.today();
        if input.visit_date > today {
            return Err(CareError::invalid_visit(format!(
                "visit date {} is in the future (today is {} in {})",
                input.visit_date, today, self.timezone
            )));
        }

        let note = VisitNote::submitted(caregiver_id, input, Utc::now());
        self.store.record_submission(&note).await?;
        info!(
            note_id = %note.id,
            minutes = note.duration_minutes(),
            follow_up = note.follow_up_required,
            "Visit note submitted"
        );
        Ok(note)
    }

    pub async fn get_note(&self, id: VisitNoteId) -> Result<VisitNote, CareError> {
        Ok(self.store.get_note(id).await?)
    }

    pub async fn notes_for_client(
        &self,
        client_id: ClientId,
        limit: Option<u32>,
    ) -> Result<Vec<VisitNote>, CareError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
        Ok(self.store.notes_for_client(client_id, limit).await?)
    }

    /// Saves the in-progress form, replacing any earlier draft
    #[instrument(skip(self, form))]
    pub async fn save_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
        form: serde_json::Value,
    ) -> Result<VisitNoteDraft, CareError> {
        if !form.is_object() {
            return Err(CareError::InvalidDraft("draft must be a JSON object".to_string()));
        }
        let size = serde_json::to_vec(&form)
            .map_err(|e| CareError::InvalidDraft(e.to_string()))?
            .len();
        if size > MAX_DRAFT_BYTES {
            return Err(CareError::InvalidDraft(format!(
                "draft is {} bytes; the limit is {}",
                size, MAX_DRAFT_BYTES
            )));
        }

        let draft = VisitNoteDraft {
            caregiver_id,
            client_id,
            form,
            saved_at: Utc::now(),
        };
        self.store.upsert_draft(&draft).await?;
        debug!(bytes = size, "Draft saved");
        Ok(draft)
    }

    pub async fn load_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
    ) -> Result<Option<VisitNoteDraft>, CareError> {
        Ok(self.store.get_draft(caregiver_id, client_id).await?)
    }

    /// Returns whether a draft was removed
    pub async fn discard_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
    ) -> Result<bool, CareError> {
        Ok(self.store.delete_draft(caregiver_id, client_id).await?)
    }
}
