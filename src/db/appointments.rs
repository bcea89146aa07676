use chrono::{NaiveDate, NaiveTime};
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::db::models::{Appointment, AppointmentStatus, AppointmentType, Role};
use crate::error::AppError;

const APPOINTMENT_SELECT: &str = r#"
SELECT a.appointment_id, a.patient_id, pu.full_name AS patient_name,
       a.provider_id, du.full_name AS provider_name,
       a.appointment_date, a.appointment_time, a.duration_minutes,
       a.type, a.status, a.notes, a.created_at, a.updated_at
FROM appointments a
JOIN users pu ON pu.user_id = a.patient_id
JOIN users du ON du.user_id = a.provider_id
"#;

pub struct NewAppointment {
    pub patient_id: i64,
    pub provider_id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: i64,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
}

/// Which appointments a caller may see; `None` on both sides means all
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentScope {
    pub patient_id: Option<i64>,
    pub provider_id: Option<i64>,
}

#[derive(Debug, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub struct AppointmentRepository;

impl AppointmentRepository {
    /// Book a slot. The provider check, the conflict check and the insert
    /// share one transaction.
    pub async fn create(
        pool: &Pool<Sqlite>,
        new: NewAppointment,
    ) -> Result<Appointment, AppError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        let patient = sqlx::query_as::<_, (Role, bool)>(
            "SELECT role, is_active FROM users WHERE user_id = ?",
        )
        .bind(new.patient_id)
        .fetch_optional(&mut *tx)
        .await?;
        match patient {
            Some((Role::Patient, true)) => {}
            Some(_) => return Err(AppError::Validation("Appointments can only be booked for active patients".to_string())),
            None => return Err(AppError::NotFound("Patient not found".to_string())),
        }

        let provider = sqlx::query_as::<_, (Role, bool)>(
            "SELECT role, is_active FROM users WHERE user_id = ?",
        )
        .bind(new.provider_id)
        .fetch_optional(&mut *tx)
        .await?;
        match provider {
            Some((role, true)) if role.is_provider() => {}
            Some(_) => return Err(AppError::Validation("Selected user is not an active provider".to_string())),
            None => return Err(AppError::NotFound("Provider not found".to_string())),
        }

        ensure_slot_free(
            &mut tx,
            new.provider_id,
            new.appointment_date,
            new.appointment_time,
            None,
        )
        .await?;

        let appointment_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO appointments (patient_id, provider_id, appointment_date, appointment_time,
                          duration_minutes, type, status, notes, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
RETURNING appointment_id
            "#,
        )
        .bind(new.patient_id)
        .bind(new.provider_id)
        .bind(new.appointment_date)
        .bind(new.appointment_time)
        .bind(new.duration_minutes)
        .bind(new.appointment_type)
        .bind(&new.notes)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(appointment_id, provider_id = new.provider_id, "appointment booked");

        Self::get_by_id(pool, appointment_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created appointment".to_string()))
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Appointment>, AppError> {
        let sql = format!("{} WHERE a.appointment_id = ?", APPOINTMENT_SELECT);

        let appointment = sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(appointment)
    }

    pub async fn list(
        pool: &Pool<Sqlite>,
        scope: AppointmentScope,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, AppError> {
        let sql = format!(
            r#"{}
WHERE (? IS NULL OR a.patient_id = ?)
  AND (? IS NULL OR a.provider_id = ?)
  AND (? IS NULL OR a.status = ?)
  AND (? IS NULL OR a.appointment_date >= ?)
  AND (? IS NULL OR a.appointment_date <= ?)
ORDER BY a.appointment_date, a.appointment_time
            "#,
            APPOINTMENT_SELECT
        );

        let appointments = sqlx::query_as::<_, Appointment>(&sql)
            .bind(scope.patient_id)
            .bind(scope.patient_id)
            .bind(scope.provider_id)
            .bind(scope.provider_id)
            .bind(filter.status)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.to)
            .fetch_all(pool)
            .await?;

        Ok(appointments)
    }

    /// Move `from` to `to`. The write only lands while the row still holds
    /// `from`, so two racing transitions cannot both succeed.
    pub async fn update_status(
        pool: &Pool<Sqlite>,
        id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE appointments SET status = ?, updated_at = ? WHERE appointment_id = ? AND status = ?",
        )
        .bind(to)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .bind(from)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Appointment is no longer {}",
                from.as_str()
            )));
        }

        Ok(())
    }

    pub async fn update_notes(pool: &Pool<Sqlite>, id: i64, notes: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE appointments SET notes = ?, updated_at = ? WHERE appointment_id = ?")
            .bind(notes)
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Move an appointment to a new slot; it goes back to `pending`
    pub async fn reschedule(
        pool: &Pool<Sqlite>,
        id: i64,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let (provider_id, status) = sqlx::query_as::<_, (i64, AppointmentStatus)>(
            "SELECT provider_id, status FROM appointments WHERE appointment_id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

        if status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "A {} appointment cannot be rescheduled",
                status.as_str()
            )));
        }

        ensure_slot_free(&mut tx, provider_id, date, time, Some(id)).await?;

        let result = sqlx::query(
            r#"
UPDATE appointments
SET appointment_date = ?, appointment_time = ?, status = 'pending', updated_at = ?
WHERE appointment_id = ? AND status NOT IN ('completed', 'cancelled')
            "#,
        )
        .bind(date)
        .bind(time)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Appointment was closed before it could be rescheduled".to_string(),
            ));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM appointments WHERE appointment_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// A provider may access a patient's records once they share a
    /// non-cancelled appointment.
    pub async fn has_care_relationship(
        pool: &Pool<Sqlite>,
        provider_id: i64,
        patient_id: i64,
    ) -> Result<bool, AppError> {
        let exists: i64 = sqlx::query_scalar(
            r#"
SELECT EXISTS(
    SELECT 1 FROM appointments
    WHERE provider_id = ? AND patient_id = ? AND status != 'cancelled'
)
            "#,
        )
        .bind(provider_id)
        .bind(patient_id)
        .fetch_one(pool)
        .await?;

        Ok(exists >= 1)
    }
}

async fn ensure_slot_free(
    conn: &mut SqliteConnection,
    provider_id: i64,
    date: NaiveDate,
    time: NaiveTime,
    exclude: Option<i64>,
) -> Result<(), AppError> {
    let taken: i64 = sqlx::query_scalar(
        r#"
SELECT EXISTS(
    SELECT 1 FROM appointments
    WHERE provider_id = ? AND appointment_date = ? AND appointment_time = ?
      AND status != 'cancelled'
      AND (? IS NULL OR appointment_id != ?)
)
        "#,
    )
    .bind(provider_id)
    .bind(date)
    .bind(time)
    .bind(exclude)
    .bind(exclude)
    .fetch_one(conn)
    .await?;

    if taken >= 1 {
        return Err(AppError::Conflict(
            "The provider already has an appointment at this time".to_string(),
        ));
    }

    Ok(())
}
