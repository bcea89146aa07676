use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::db::appointments::{AppointmentFilter, AppointmentScope, NewAppointment};
use crate::db::{Appointment, AppointmentRepository, AppointmentStatus, AppointmentType, Role};
use crate::error::AppError;

const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    pub status: Option<AppointmentStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Only honored for admins booking on a patient's behalf
    pub patient_id: Option<i64>,
    pub provider_id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: Option<i64>,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

fn scope_for(auth: &AuthUser) -> AppointmentScope {
    match auth.role {
        Role::Patient => AppointmentScope {
            patient_id: Some(auth.user_id),
            provider_id: None,
        },
        Role::Psychiatrist | Role::Counselor => AppointmentScope {
            patient_id: None,
            provider_id: Some(auth.user_id),
        },
        Role::Admin => AppointmentScope::default(),
    }
}

/// Load an appointment the caller takes part in (admins see all)
async fn load_visible(state: &AppState, auth: &AuthUser, id: i64) -> Result<Appointment, AppError> {
    let appointment = AppointmentRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

    if auth.is_admin() || appointment.patient_id == auth.user_id || appointment.provider_id == auth.user_id {
        Ok(appointment)
    } else {
        Err(AppError::Forbidden("Not a participant of this appointment".to_string()))
    }
}

/// Who may move an appointment into `next`
fn check_status_change(
    auth: &AuthUser,
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), AppError> {
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot change status from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    match auth.role {
        Role::Patient if next != AppointmentStatus::Cancelled => Err(AppError::Forbidden(
            "Patients can only cancel appointments".to_string(),
        )),
        _ => Ok(()),
    }
}

/// GET /api/appointments
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::Validation("from must not be after to".to_string()));
        }
    }

    let appointments = AppointmentRepository::list(
        &state.db,
        scope_for(&auth),
        &AppointmentFilter {
            status: query.status,
            from: query.from,
            to: query.to,
        },
    )
    .await?;

    Ok(Json(appointments))
}

/// POST /api/appointments
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    auth.require_role(&[Role::Patient, Role::Admin])?;

    let patient_id = if auth.is_admin() {
        req.patient_id
            .ok_or_else(|| AppError::Validation("patient_id is required".to_string()))?
    } else {
        auth.user_id
    };

    let today = chrono::Utc::now().date_naive();
    if req.appointment_date < today {
        return Err(AppError::Validation(
            "Appointments cannot be booked in the past".to_string(),
        ));
    }

    let duration_minutes = validation::score_in_range(
        "duration_minutes",
        req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
        15,
        240,
    )?;
    let notes = validation::optional_text("notes", req.notes.as_deref(), 2000)?;

    let appointment = AppointmentRepository::create(
        &state.db,
        NewAppointment {
            patient_id,
            provider_id: req.provider_id,
            appointment_date: req.appointment_date,
            appointment_time: req.appointment_time,
            duration_minutes,
            appointment_type: req.appointment_type,
            notes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// GET /api/appointments/:id
pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(load_visible(&state, &auth, id).await?))
}

/// PATCH /api/appointments/:id
pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = load_visible(&state, &auth, id).await?;

    let reschedule = req.appointment_date.is_some() || req.appointment_time.is_some();
    if reschedule && req.status.is_some() {
        return Err(AppError::Validation(
            "Reschedule and status change must be separate requests".to_string(),
        ));
    }

    // Validate everything before writing anything
    let notes = req
        .notes
        .as_deref()
        .map(|notes| validation::required_text("notes", notes, 2000))
        .transpose()?;

    if let Some(next) = req.status {
        check_status_change(&auth, appointment.status, next)?;
    }

    let new_slot = if reschedule {
        if appointment.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "A {} appointment cannot be rescheduled",
                appointment.status.as_str()
            )));
        }

        let date = req.appointment_date.unwrap_or(appointment.appointment_date);
        let time = req.appointment_time.unwrap_or(appointment.appointment_time);
        if date < chrono::Utc::now().date_naive() {
            return Err(AppError::Validation(
                "Appointments cannot be moved into the past".to_string(),
            ));
        }
        Some((date, time))
    } else {
        None
    };

    if let Some((date, time)) = new_slot {
        AppointmentRepository::reschedule(&state.db, id, date, time).await?;
    }

    if let Some(next) = req.status {
        AppointmentRepository::update_status(&state.db, id, appointment.status, next).await?;
        tracing::info!(
            appointment_id = id,
            from = appointment.status.as_str(),
            to = next.as_str(),
            "appointment status changed"
        );
    }

    if let Some(notes) = notes {
        AppointmentRepository::update_notes(&state.db, id, &notes).await?;
    }

    let updated = AppointmentRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

    Ok(Json(updated))
}

/// DELETE /api/appointments/:id (admin)
pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    if !AppointmentRepository::delete(&state.db, id).await? {
        return Err(AppError::NotFound("Appointment not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
