use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::db::mood::{MoodSummary, NewMoodEntry};
use crate::db::{AppointmentRepository, MoodEntry, MoodRepository, Role};
use crate::error::AppError;

const MAX_ACTIVITIES: usize = 20;

#[derive(Debug, Deserialize)]
pub struct CreateMoodRequest {
    pub entry_date: Option<NaiveDate>,
    pub mood_score: i64,
    pub anxiety_level: Option<i64>,
    pub energy_level: Option<i64>,
    pub sleep_hours: Option<f64>,
    #[serde(default)]
    pub activities: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoodQuery {
    pub patient_id: Option<i64>,
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

/// Whose mood history the caller is asking for, after access checks
async fn resolve_patient(
    state: &AppState,
    auth: &AuthUser,
    requested: Option<i64>,
) -> Result<i64, AppError> {
    match auth.role {
        Role::Patient => match requested {
            None => Ok(auth.user_id),
            Some(id) if id == auth.user_id => Ok(id),
            Some(_) => Err(AppError::Forbidden("Patients can only view their own mood entries".to_string())),
        },
        Role::Psychiatrist | Role::Counselor => {
            let patient_id = requested
                .ok_or_else(|| AppError::Validation("patient_id is required".to_string()))?;
            if AppointmentRepository::has_care_relationship(&state.db, auth.user_id, patient_id).await? {
                Ok(patient_id)
            } else {
                Err(AppError::Forbidden("No care relationship with this patient".to_string()))
            }
        }
        Role::Admin => {
            requested.ok_or_else(|| AppError::Validation("patient_id is required".to_string()))
        }
    }
}

fn window_start(days: i64) -> Result<NaiveDate, AppError> {
    let days = validation::score_in_range("days", days, 1, 365)?;
    Ok(chrono::Utc::now().date_naive() - chrono::Duration::days(days - 1))
}

/// POST /api/mood (patient)
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateMoodRequest>,
) -> Result<(StatusCode, Json<MoodEntry>), AppError> {
    auth.require_role(&[Role::Patient])?;

    let today = chrono::Utc::now().date_naive();
    let entry_date = req.entry_date.unwrap_or(today);
    if entry_date > today {
        return Err(AppError::Validation("entry_date cannot be in the future".to_string()));
    }

    let mood_score = validation::score_in_range("mood_score", req.mood_score, 1, 10)?;
    let anxiety_level = req
        .anxiety_level
        .map(|v| validation::score_in_range("anxiety_level", v, 1, 10))
        .transpose()?;
    let energy_level = req
        .energy_level
        .map(|v| validation::score_in_range("energy_level", v, 1, 10))
        .transpose()?;

    if matches!(req.sleep_hours, Some(h) if !(0.0..=24.0).contains(&h)) {
        return Err(AppError::Validation("sleep_hours must be between 0 and 24".to_string()));
    }

    if req.activities.len() > MAX_ACTIVITIES {
        return Err(AppError::Validation(format!(
            "At most {} activities per entry",
            MAX_ACTIVITIES
        )));
    }
    let activities = req
        .activities
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| validation::required_text("activity", a, 50))
        .collect::<Result<Vec<_>, _>>()?;

    let entry = MoodRepository::create(
        &state.db,
        NewMoodEntry {
            patient_id: auth.user_id,
            entry_date,
            mood_score,
            anxiety_level,
            energy_level,
            sleep_hours: req.sleep_hours,
            activities,
            notes: validation::optional_text("notes", req.notes.as_deref(), 2000)?,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/mood
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<MoodQuery>,
) -> Result<Json<Vec<MoodEntry>>, AppError> {
    let since = window_start(query.days)?;
    let patient_id = resolve_patient(&state, &auth, query.patient_id).await?;

    let entries = MoodRepository::list_since(&state.db, patient_id, since).await?;
    Ok(Json(entries))
}

/// GET /api/mood/summary
pub async fn summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<MoodQuery>,
) -> Result<Json<MoodSummary>, AppError> {
    let since = window_start(query.days)?;
    let patient_id = resolve_patient(&state, &auth, query.patient_id).await?;

    let entries = MoodRepository::list_since(&state.db, patient_id, since).await?;
    Ok(Json(MoodSummary::from_entries(&entries)))
}

/// DELETE /api/mood/:id (owner)
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let entry = MoodRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Mood entry not found".to_string()))?;

    if entry.patient_id != auth.user_id {
        return Err(AppError::Forbidden("Cannot delete another patient's entry".to_string()));
    }

    MoodRepository::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
