//! PostgreSQL visit note adapter

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    CaregiverId, ClientId, DomainPort, HealthCheckResult, HealthCheckable, PortError, VisitNoteId,
};
use domain_care::{VisitNote, VisitNoteDraft, VisitNoteStatus, VisitNoteStore, Vitals};

use crate::adapters::ping;
use crate::error::DatabaseError;
use crate::repositories::visit_notes::{DraftRow, VisitNoteRepository, VisitNoteRow};

/// PostgreSQL-backed implementation of the `VisitNoteStore` port
#[derive(Debug, Clone)]
pub struct PostgresVisitNoteStore {
    repository: VisitNoteRepository,
    pool: PgPool,
}

impl PostgresVisitNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: VisitNoteRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresVisitNoteStore {}

#[async_trait]
impl HealthCheckable for PostgresVisitNoteStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-visit-note-store").await
    }
}

#[async_trait]
impl VisitNoteStore for PostgresVisitNoteStore {
    #[instrument(skip(self, note), fields(note_id = %note.id))]
    async fn record_submission(&self, note: &VisitNote) -> Result<(), PortError> {
        let row = note_to_row(note)?;
        self.repository
            .insert_submitted(&row)
            .await
            .map_err(PortError::from)
    }

    async fn get_note(&self, id: VisitNoteId) -> Result<VisitNote, PortError> {
        let row = self.repository.get(id.into()).await?;
        Ok(row_to_note(row)?)
    }

    async fn notes_for_client(
        &self,
        client_id: ClientId,
        limit: u32,
    ) -> Result<Vec<VisitNote>, PortError> {
        let rows = self
            .repository
            .for_client(client_id.into(), i64::from(limit))
            .await?;
        rows.into_iter()
            .map(|row| row_to_note(row).map_err(PortError::from))
            .collect()
    }

    async fn upsert_draft(&self, draft: &VisitNoteDraft) -> Result<(), PortError> {
        let row = DraftRow {
            caregiver_id: draft.caregiver_id.into(),
            client_id: draft.client_id.into(),
            form: draft.form.clone(),
            saved_at: draft.saved_at,
        };
        self.repository
            .upsert_draft(&row)
            .await
            .map_err(PortError::from)
    }

    async fn get_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
    ) -> Result<Option<VisitNoteDraft>, PortError> {
        let row = self
            .repository
            .get_draft(caregiver_id.into(), client_id.into())
            .await?;
        Ok(row.map(|row| VisitNoteDraft {
            caregiver_id: row.caregiver_id.into(),
            client_id: row.client_id.into(),
            form: row.form,
            saved_at: row.saved_at,
        }))
    }

    async fn delete_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
    ) -> Result<bool, PortError> {
        let removed = self
            .repository
            .delete_draft(caregiver_id.into(), client_id.into())
            .await?;
        Ok(removed > 0)
    }
}

fn note_to_row(note: &VisitNote) -> Result<VisitNoteRow, PortError> {
    let vitals = note
        .vitals
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| PortError::transformation(format!("vitals: {}", e)))?;

    Ok(VisitNoteRow {
        note_id: note.id.into(),
        caregiver_id: note.caregiver_id.into(),
        client_id: note.client_id.into(),
        visit_date: note.visit_date,
        start_time: note.start_time,
        end_time: note.end_time,
        tasks_performed: note.tasks_performed.clone(),
        client_condition: note.client_condition.clone(),
        vitals,
        notes: note.notes.clone(),
        follow_up_required: note.follow_up_required,
        status: note.status.as_str().to_string(),
        submitted_at: note.submitted_at,
        created_at: note.created_at,
    })
}

fn row_to_note(row: VisitNoteRow) -> Result<VisitNote, DatabaseError> {
    let status = VisitNoteStatus::parse(&row.status).ok_or_else(|| {
        DatabaseError::serialization(format!("unknown visit note status '{}'", row.status))
    })?;
    let vitals = row
        .vitals
        .map(serde_json::from_value::<Vitals>)
        .transpose()
        .map_err(|e| DatabaseError::serialization(format!("vitals: {}", e)))?;

    Ok(VisitNote {
        id: row.note_id.into(),
        caregiver_id: row.caregiver_id.into(),
        client_id: row.client_id.into(),
        visit_date: row.visit_date,
        start_time: row.start_time,
        end_time: row.end_time,
        tasks_performed: row.tasks_performed,
        client_condition: row.client_condition,
        vitals,
        notes: row.notes,
        follow_up_required: row.follow_up_required,
        status,
        submitted_at: row.submitted_at,
        created_at: row.created_at,
    })
}
