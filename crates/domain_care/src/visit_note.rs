//! Caregiver visit notes
//!
//! A caregiver documents each visit: when it happened, what was done, how
//! the client was, and optional vitals. [`VisitNoteInput`] is what the form
//! submits and carries the validation rules; [`VisitNote`] is the stored
//! record.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::{CaregiverId, ClientId, VisitNoteId};

/// Lifecycle of a visit note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitNoteStatus {
    Draft,
    Submitted,
}

impl VisitNoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitNoteStatus::Draft => "draft",
            VisitNoteStatus::Submitted => "submitted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(VisitNoteStatus::Draft),
            "submitted" => Some(VisitNoteStatus::Submitted),
            _ => None,
        }
    }
}

/// Vital signs taken during the visit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct Vitals {
    /// Free text such as "120/80"
    #[validate(length(max = 20, message = "blood pressure must be at most 20 characters"))]
    pub blood_pressure: Option<String>,

    /// Beats per minute
    #[validate(range(min = 20, max = 250, message = "pulse must be between 20 and 250 bpm"))]
    pub pulse: Option<u16>,

    /// Degrees Fahrenheit
    #[validate(range(min = 90.0, max = 110.0, message = "temperature must be between 90 and 110 °F"))]
    pub temperature_f: Option<f64>,
}

impl Vitals {
    pub fn is_empty(&self) -> bool {
        self.blood_pressure.as_deref().map_or(true, |bp| bp.trim().is_empty())
            && self.pulse.is_none()
            && self.temperature_f.is_none()
    }
}

/// A visit note as submitted by a caregiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_visit_shape", skip_on_field_errors = false))]
pub struct VisitNoteInput {
    pub client_id: ClientId,
    pub visit_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,

    #[validate(length(min = 1, message = "at least one task must be recorded"))]
    pub tasks_performed: Vec<String>,

    #[validate(length(max = 1000, message = "client condition must be at most 1000 characters"))]
    pub client_condition: Option<String>,

    #[validate(nested)]
    pub vitals: Option<Vitals>,

    #[validate(length(max = 5000, message = "notes must be at most 5000 characters"))]
    pub notes: Option<String>,

    #[serde(default)]
    pub follow_up_required: bool,
}

fn validate_visit_shape(input: &VisitNoteInput) -> Result<(), ValidationError> {
    if input.end_time <= input.start_time {
        let mut err = ValidationError::new("visit_window");
        err.message = Some("end time must be after start time".into());
        return Err(err);
    }
    if input.tasks_performed.iter().any(|t| t.trim().is_empty()) {
        let mut err = ValidationError::new("blank_task");
        err.message = Some("tasks cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

/// A persisted visit note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitNote {
    pub id: VisitNoteId,
    pub caregiver_id: CaregiverId,
    pub client_id: ClientId,
    pub visit_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub tasks_performed: Vec<String>,
    pub client_condition: Option<String>,
    pub vitals: Option<Vitals>,
    pub notes: Option<String>,
    pub follow_up_required: bool,
    pub status: VisitNoteStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VisitNote {
    /// Builds the submitted record from validated input
    pub fn submitted(caregiver_id: CaregiverId, input: VisitNoteInput, at: DateTime<Utc>) -> Self {
        Self {
            id: VisitNoteId::new_v7(),
            caregiver_id,
            client_id: input.client_id,
            visit_date: input.visit_date,
            start_time: input.start_time,
            end_time: input.end_time,
            tasks_performed: input
                .tasks_performed
                .into_iter()
                .map(|t| t.trim().to_string())
                .collect(),
            client_condition: non_blank(input.client_condition),
            vitals: input.vitals.filter(|v| !v.is_empty()),
            notes: non_blank(input.notes),
            follow_up_required: input.follow_up_required,
            status: VisitNoteStatus::Submitted,
            submitted_at: Some(at),
            created_at: at,
        }
    }

    /// Visit length in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Unsubmitted form state, one per caregiver and client
///
/// Drafts are stored as the raw form payload and are not validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitNoteDraft {
    pub caregiver_id: CaregiverId,
    pub client_id: ClientId,
    pub form: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> VisitNoteInput {
        VisitNoteInput {
            client_id: ClientId::new(),
            visit_date: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            tasks_performed: vec!["Bathing".to_string(), "Meal preparation".to_string()],
            client_condition: Some("Alert and cheerful".to_string()),
            vitals: Some(Vitals {
                blood_pressure: Some("124/82".to_string()),
                pulse: Some(72),
                temperature_f: Some(98.4),
            }),
            notes: None,
            follow_up_required: false,
        }
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_tasks_required() {
        let mut note = input();
        note.tasks_performed.clear();
        let errors = note.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("tasks_performed"));
    }

    #[test]
    fn test_blank_task_rejected() {
        let mut note = input();
        note.tasks_performed.push("   ".to_string());
        assert!(note.validate().is_err());
    }

    #[test]
    fn test_vitals_ranges() {
        let mut note = input();
        note.vitals = Some(Vitals {
            pulse: Some(300),
            ..Default::default()
        });
        assert!(note.validate().is_err());

        note.vitals = Some(Vitals {
            temperature_f: Some(89.9),
            ..Default::default()
        });
        assert!(note.validate().is_err());

        note.vitals = Some(Vitals {
            pulse: Some(20),
            temperature_f: Some(110.0),
            ..Default::default()
        });
        assert!(note.validate().is_ok());
    }

    #[test]
    fn test_end_must_follow_start() {
        let mut note = input();
        note.end_time = note.start_time;
        assert!(note.validate().is_err());
    }

    #[test]
    fn test_notes_length_limit() {
        let mut note = input();
        note.notes = Some("x".repeat(5000));
        assert!(note.validate().is_ok());
        note.notes = Some("x".repeat(5001));
        assert!(note.validate().is_err());
    }

    #[test]
    fn test_submitted_normalizes_fields() {
        let mut raw = input();
        raw.notes = Some("   ".to_string());
        raw.tasks_performed = vec!["  Bathing ".to_string()];
        raw.vitals = Some(Vitals::default());

        let note = VisitNote::submitted(CaregiverId::new(), raw, Utc::now());
        assert_eq!(note.status, VisitNoteStatus::Submitted);
        assert_eq!(note.tasks_performed, vec!["Bathing".to_string()]);
        assert!(note.notes.is_none());
        assert!(note.vitals.is_none());
        assert_eq!(note.duration_minutes(), 150);
    }
}
