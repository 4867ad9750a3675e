//! Care Domain Ports
//!
//! `VisitNoteStore` persists submitted notes and the per-caregiver drafts.
//! The PostgreSQL implementation lives in `infra_db`; an in-memory one is in
//! [`mock`].

use async_trait::async_trait;

use core_kernel::{CaregiverId, ClientId, DomainPort, HealthCheckable, PortError, VisitNoteId};

use crate::visit_note::{VisitNote, VisitNoteDraft};

/// Storage for visit notes and drafts
#[async_trait]
pub trait VisitNoteStore: DomainPort + HealthCheckable {
    /// Stores a submitted note and deletes the caregiver's draft for the same
    /// client, atomically
    async fn record_submission(&self, note: &VisitNote) -> Result<(), PortError>;

    async fn get_note(&self, id: VisitNoteId) -> Result<VisitNote, PortError>;

    /// Notes for a client, most recent visit first
    async fn notes_for_client(
        &self,
        client_id: ClientId,
        limit: u32,
    ) -> Result<Vec<VisitNote>, PortError>;

    /// Inserts or replaces the draft for `(caregiver_id, client_id)`
    async fn upsert_draft(&self, draft: &VisitNoteDraft) -> Result<(), PortError>;

    async fn get_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
    ) -> Result<Option<VisitNoteDraft>, PortError>;

    /// Returns whether a draft existed
    async fn delete_draft(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
    ) -> Result<bool, PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    /// In-memory `VisitNoteStore`
    #[derive(Debug, Default)]
    pub struct MockVisitNoteStore {
        notes: RwLock<HashMap<VisitNoteId, VisitNote>>,
        drafts: RwLock<HashMap<(CaregiverId, ClientId), VisitNoteDraft>>,
        known_clients: Option<HashSet<ClientId>>,
        fail_writes: AtomicBool,
    }

    impl MockVisitNoteStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Rejects notes for any client not listed, like the `client_id`
        /// foreign key does
        pub fn with_clients(clients: impl IntoIterator<Item = ClientId>) -> Self {
            Self {
                known_clients: Some(clients.into_iter().collect()),
                ..Self::default()
            }
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub async fn note_count(&self) -> usize {
            self.notes.read().await.len()
        }

        fn check_writable(&self) -> Result<(), PortError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(PortError::connection("injected store failure"));
            }
            Ok(())
        }
    }

    impl DomainPort for MockVisitNoteStore {}

    #[async_trait]
    impl HealthCheckable for MockVisitNoteStore {
        async fn health_check(&self) -> core_kernel::HealthCheckResult {
            core_kernel::HealthCheckResult::healthy("mock-visit-note-store")
        }
    }

    #[async_trait]
    impl VisitNoteStore for MockVisitNoteStore {
        async fn record_submission(&self, note: &VisitNote) -> Result<(), PortError> {
            self.check_writable()?;
            if let Some(known) = &self.known_clients {
                if !known.contains(&note.client_id) {
                    return Err(PortError::validation(format!(
                        "client {} does not exist",
                        note.client_id
                    )));
                }
            }
            let mut notes = self.notes.write().await;
            let mut drafts = self.drafts.write().await;
            if notes.contains_key(&note.id) {
                return Err(PortError::conflict(format!("visit note {} already exists", note.id)));
            }
            notes.insert(note.id, note.clone());
            drafts.remove(&(note.caregiver_id, note.client_id));
            Ok(())
        }

        async fn get_note(&self, id: VisitNoteId) -> Result<VisitNote, PortError> {
            self.notes
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("VisitNote", id))
        }

        async fn notes_for_client(
            &self,
            client_id: ClientId,
            limit: u32,
        ) -> Result<Vec<VisitNote>, PortError> {
            let mut notes: Vec<_> = self
                .notes
                .read()
                .await
                .values()
                .filter(|n| n.client_id == client_id)
                .cloned()
                .collect();
            notes.sort_by(|a, b| {
                (b.visit_date, b.start_time).cmp(&(a.visit_date, a.start_time))
            });
            notes.truncate(limit as usize);
            Ok(notes)
        }

        async fn upsert_draft(&self, draft: &VisitNoteDraft) -> Result<(), PortError> {
            self.check_writable()?;
            self.drafts
                .write()
                .await
                .insert((draft.caregiver_id, draft.client_id), draft.clone());
            Ok(())
        }

        async fn get_draft(
            &self,
            caregiver_id: CaregiverId,
            client_id: ClientId,
        ) -> Result<Option<VisitNoteDraft>, PortError> {
            Ok(self.drafts.read().await.get(&(caregiver_id, client_id)).cloned())
        }

        async fn delete_draft(
            &self,
            caregiver_id: CaregiverId,
            client_id: ClientId,
        ) -> Result<bool, PortError> {
            self.check_writable()?;
            Ok(self
                .drafts
                .write()
                .await
                .remove(&(caregiver_id, client_id))
                .is_some())
        }
    }
}
