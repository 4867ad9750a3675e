//! Visit note handlers
//!
//! The caregiver is always the token subject; drafts are addressed by
//! `?client_id=`.

use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};

use core_kernel::VisitNoteId;
use domain_billing::Role;
use domain_care::{VisitNote, VisitNoteDraft, VisitNoteInput};

use crate::auth::Claims;
use crate::dto::visit_notes::{DraftQuery, HistoryQuery};
use crate::{error::ApiError, AppState};

/// Submits a completed visit note
pub async fn submit_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<VisitNoteInput>, JsonRejection>,
) -> Result<(StatusCode, Json<VisitNote>), ApiError> {
    let caregiver_id = claims.caregiver_id()?;
    let Json(input) = payload?;
    let note = state.visit_notes.submit(caregiver_id, input).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<VisitNote>, ApiError> {
    claims.require(Role::Caregiver)?;
    let id = VisitNoteId::from_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("malformed visit note id: {}", id)))?;
    Ok(Json(state.visit_notes.get_note(id).await?))
}

/// A client's visit history, most recent first
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<VisitNote>>, ApiError> {
    claims.require(Role::Caregiver)?;
    let Query(query) = query?;
    let notes = state
        .visit_notes
        .notes_for_client(query.client_id.into(), query.limit)
        .await?;
    Ok(Json(notes))
}

pub async fn get_draft(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<DraftQuery>, QueryRejection>,
) -> Result<Json<VisitNoteDraft>, ApiError> {
    let caregiver_id = claims.caregiver_id()?;
    let Query(query) = query?;
    state
        .visit_notes
        .load_draft(caregiver_id, query.client_id.into())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no draft saved for this client".to_string()))
}

/// Autosaves the in-progress form
pub async fn save_draft(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<DraftQuery>, QueryRejection>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<VisitNoteDraft>, ApiError> {
    let caregiver_id = claims.caregiver_id()?;
    let Query(query) = query?;
    let Json(form) = payload?;
    let draft = state
        .visit_notes
        .save_draft(caregiver_id, query.client_id.into(), form)
        .await?;
    Ok(Json(draft))
}

pub async fn discard_draft(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<DraftQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let caregiver_id = claims.caregiver_id()?;
    let Query(query) = query?;
    if state
        .visit_notes
        .discard_draft(caregiver_id, query.client_id.into())
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("no draft saved for this client".to_string()))
    }
}
