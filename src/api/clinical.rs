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
use crate::db::clinical_notes::NewClinicalNote;
use crate::db::treatment_plans::{NewTreatmentPlan, PlanChanges, PlanScope};
use crate::db::{
    AppointmentRepository, ClinicalNote, ClinicalNoteRepository, NoteType, PlanStatus, Role,
    TreatmentPlan, TreatmentPlanRepository,
};
use crate::error::AppError;

const MAX_NOTE_CHARS: usize = 20_000;

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub note_type: NoteType,
    pub content: String,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub note_type: Option<NoteType>,
    pub content: Option<String>,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub patient_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub patient_id: i64,
    pub title: String,
    pub diagnosis: Option<String>,
    pub goals: String,
    pub interventions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub title: Option<String>,
    pub diagnosis: Option<String>,
    pub goals: Option<String>,
    pub interventions: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Deserialize)]
pub struct PlansQuery {
    pub patient_id: Option<i64>,
    pub status: Option<PlanStatus>,
}

async fn require_care_relationship(
    state: &AppState,
    provider_id: i64,
    patient_id: i64,
) -> Result<(), AppError> {
    if AppointmentRepository::has_care_relationship(&state.db, provider_id, patient_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden("No care relationship with this patient".to_string()))
    }
}

fn check_dates(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), AppError> {
    match end {
        Some(end) if end < start => Err(AppError::Validation(
            "end_date must not be before start_date".to_string(),
        )),
        _ => Ok(()),
    }
}

// Clinical notes

async fn load_note(state: &AppState, id: i64) -> Result<ClinicalNote, AppError> {
    ClinicalNoteRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Clinical note not found".to_string()))
}

/// POST /api/clinical-notes (provider)
pub async fn create_note(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<ClinicalNote>), AppError> {
    auth.require_provider()?;

    let content = validation::required_text("content", &req.content, MAX_NOTE_CHARS)?;
    let diagnosis = validation::optional_text("diagnosis", req.diagnosis.as_deref(), 500)?;

    require_care_relationship(&state, auth.user_id, req.patient_id).await?;

    if let Some(appointment_id) = req.appointment_id {
        let appointment = AppointmentRepository::get_by_id(&state.db, appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

        if appointment.provider_id != auth.user_id || appointment.patient_id != req.patient_id {
            return Err(AppError::Validation(
                "Appointment does not belong to this provider and patient".to_string(),
            ));
        }
    }

    let note = ClinicalNoteRepository::create(
        &state.db,
        NewClinicalNote {
            patient_id: req.patient_id,
            provider_id: auth.user_id,
            appointment_id: req.appointment_id,
            note_type: req.note_type,
            content,
            diagnosis,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(note)))
}

/// GET /api/clinical-notes
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<NotesQuery>,
) -> Result<Json<Vec<ClinicalNote>>, AppError> {
    let provider_id = match auth.role {
        Role::Psychiatrist | Role::Counselor => Some(auth.user_id),
        Role::Admin => None,
        Role::Patient => {
            return Err(AppError::Forbidden("Clinical notes are not available to patients".to_string()))
        }
    };

    let notes = ClinicalNoteRepository::list(&state.db, provider_id, query.patient_id).await?;
    Ok(Json(notes))
}

/// GET /api/clinical-notes/:id (author or admin)
pub async fn get_note(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<ClinicalNote>, AppError> {
    let note = load_note(&state, id).await?;

    if note.provider_id != auth.user_id && !auth.is_admin() {
        return Err(AppError::Forbidden("Not the author of this note".to_string()));
    }

    Ok(Json(note))
}

/// PUT /api/clinical-notes/:id (author)
pub async fn update_note(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<ClinicalNote>, AppError> {
    let note = load_note(&state, id).await?;
    if note.provider_id != auth.user_id {
        return Err(AppError::Forbidden("Only the author can edit this note".to_string()));
    }

    let content = req
        .content
        .as_deref()
        .map(|c| validation::required_text("content", c, MAX_NOTE_CHARS))
        .transpose()?;
    let diagnosis = validation::optional_text("diagnosis", req.diagnosis.as_deref(), 500)?;

    ClinicalNoteRepository::update(
        &state.db,
        id,
        req.note_type,
        content.as_deref(),
        diagnosis.as_deref(),
    )
    .await?;

    Ok(Json(load_note(&state, id).await?))
}

/// DELETE /api/clinical-notes/:id (author or admin)
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let note = load_note(&state, id).await?;
    if note.provider_id != auth.user_id && !auth.is_admin() {
        return Err(AppError::Forbidden("Not the author of this note".to_string()));
    }

    ClinicalNoteRepository::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Treatment plans

async fn load_plan(state: &AppState, id: i64) -> Result<TreatmentPlan, AppError> {
    TreatmentPlanRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Treatment plan not found".to_string()))
}

/// POST /api/treatment-plans (provider)
pub async fn create_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<TreatmentPlan>), AppError> {
    auth.require_provider()?;

    let title = validation::required_text("title", &req.title, 200)?;
    let goals = validation::required_text("goals", &req.goals, MAX_NOTE_CHARS)?;
    let diagnosis = validation::optional_text("diagnosis", req.diagnosis.as_deref(), 500)?;
    let interventions =
        validation::optional_text("interventions", req.interventions.as_deref(), MAX_NOTE_CHARS)?;
    check_dates(req.start_date, req.end_date)?;

    require_care_relationship(&state, auth.user_id, req.patient_id).await?;

    let plan = TreatmentPlanRepository::create(
        &state.db,
        NewTreatmentPlan {
            patient_id: req.patient_id,
            provider_id: auth.user_id,
            title,
            diagnosis,
            goals,
            interventions,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?;

    tracing::info!(plan_id = plan.plan_id, provider_id = auth.user_id, "treatment plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

/// GET /api/treatment-plans
pub async fn list_plans(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PlansQuery>,
) -> Result<Json<Vec<TreatmentPlan>>, AppError> {
    let scope = match auth.role {
        Role::Patient => PlanScope {
            patient_id: Some(auth.user_id),
            provider_id: None,
        },
        Role::Psychiatrist | Role::Counselor => PlanScope {
            patient_id: query.patient_id,
            provider_id: Some(auth.user_id),
        },
        Role::Admin => PlanScope {
            patient_id: query.patient_id,
            provider_id: None,
        },
    };

    let plans = TreatmentPlanRepository::list(&state.db, scope, query.status).await?;
    Ok(Json(plans))
}

/// GET /api/treatment-plans/:id (patient, author or admin)
pub async fn get_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<TreatmentPlan>, AppError> {
    let plan = load_plan(&state, id).await?;

    if plan.patient_id != auth.user_id && plan.provider_id != auth.user_id && !auth.is_admin() {
        return Err(AppError::Forbidden("Not permitted to view this treatment plan".to_string()));
    }

    Ok(Json(plan))
}

/// PUT /api/treatment-plans/:id (author)
pub async fn update_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<Json<TreatmentPlan>, AppError> {
    let plan = load_plan(&state, id).await?;
    if plan.provider_id != auth.user_id {
        return Err(AppError::Forbidden("Only the author can edit this plan".to_string()));
    }

    check_dates(plan.start_date, req.end_date)?;

    let changes = PlanChanges {
        title: req
            .title
            .as_deref()
            .map(|t| validation::required_text("title", t, 200))
            .transpose()?,
        diagnosis: validation::optional_text("diagnosis", req.diagnosis.as_deref(), 500)?,
        goals: req
            .goals
            .as_deref()
            .map(|g| validation::required_text("goals", g, MAX_NOTE_CHARS))
            .transpose()?,
        interventions: validation::optional_text(
            "interventions",
            req.interventions.as_deref(),
            MAX_NOTE_CHARS,
        )?,
        end_date: req.end_date,
        status: req.status,
    };

    TreatmentPlanRepository::update(&state.db, id, changes).await?;
    Ok(Json(load_plan(&state, id).await?))
}

/// DELETE /api/treatment-plans/:id (author or admin)
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let plan = load_plan(&state, id).await?;
    if plan.provider_id != auth.user_id && !auth.is_admin() {
        return Err(AppError::Forbidden("Not permitted to delete this plan".to_string()));
    }

    TreatmentPlanRepository::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
