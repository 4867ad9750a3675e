//! Visit note repository implementation

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DatabaseError;

const NOTE_COLUMNS: &str = r#"
    note_id, caregiver_id, client_id, visit_date, start_time, end_time,
    tasks_performed, client_condition, vitals, notes, follow_up_required,
    status, submitted_at, created_at
"#;

/// Repository for submitted visit notes and their drafts
#[derive(Debug, Clone)]
pub struct VisitNoteRepository {
    pool: PgPool,
}

impl VisitNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a note and removes the caregiver's draft for the client
    ///
    /// Both statements share one transaction so a failed insert leaves the
    /// draft in place.
    pub async fn insert_submitted(&self, note: &VisitNoteRow) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO visit_notes (
                note_id, caregiver_id, client_id, visit_date, start_time, end_time,
                tasks_performed, client_condition, vitals, notes, follow_up_required,
                status, submitted_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(note.note_id)
        .bind(note.caregiver_id)
        .bind(note.client_id)
        .bind(note.visit_date)
        .bind(note.start_time)
        .bind(note.end_time)
        .bind(&note.tasks_performed)
        .bind(&note.client_condition)
        .bind(&note.vitals)
        .bind(&note.notes)
        .bind(note.follow_up_required)
        .bind(&note.status)
        .bind(note.submitted_at)
        .bind(note.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM visit_note_drafts WHERE caregiver_id = $1 AND client_id = $2")
            .bind(note.caregiver_id)
            .bind(note.client_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, note_id: Uuid) -> Result<VisitNoteRow, DatabaseError> {
        sqlx::query_as::<_, VisitNoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM visit_notes WHERE note_id = $1"
        ))
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("VisitNote", note_id))
    }

    /// Most recent visits first
    pub async fn for_client(&self, client_id: Uuid, limit: i64) -> Result<Vec<VisitNoteRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, VisitNoteRow>(&format!(
            r#"
            SELECT {NOTE_COLUMNS} FROM visit_notes
            WHERE client_id = $1
            ORDER BY visit_date DESC, start_time DESC
            LIMIT $2
            "#
        ))
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_draft(&self, draft: &DraftRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO visit_note_drafts (caregiver_id, client_id, form, saved_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (caregiver_id, client_id)
            DO UPDATE SET form = EXCLUDED.form, saved_at = EXCLUDED.saved_at
            "#,
        )
        .bind(draft.caregiver_id)
        .bind(draft.client_id)
        .bind(&draft.form)
        .bind(draft.saved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_draft(
        &self,
        caregiver_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<DraftRow>, DatabaseError> {
        let row = sqlx::query_as::<_, DraftRow>(
            r#"
            SELECT caregiver_id, client_id, form, saved_at
            FROM visit_note_drafts
            WHERE caregiver_id = $1 AND client_id = $2
            "#,
        )
        .bind(caregiver_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Returns the number of rows removed
    pub async fn delete_draft(&self, caregiver_id: Uuid, client_id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM visit_note_drafts WHERE caregiver_id = $1 AND client_id = $2",
        )
        .bind(caregiver_id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VisitNoteRow {
    pub note_id: Uuid,
    pub caregiver_id: Uuid,
    pub client_id: Uuid,
    pub visit_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub tasks_performed: Vec<String>,
    pub client_condition: Option<String>,
    /// Vitals as stored in JSONB
    pub vitals: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub follow_up_required: bool,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DraftRow {
    pub caregiver_id: Uuid,
    pub client_id: Uuid,
    pub form: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}
