use sqlx::{Pool, Sqlite};

use crate::db::models::{ClinicalNote, NoteType};
use crate::error::AppError;

const NOTE_SELECT: &str = r#"
SELECT n.note_id, n.patient_id, u.full_name AS patient_name, n.provider_id, n.appointment_id,
       n.note_type, n.content, n.diagnosis, n.created_at, n.updated_at
FROM clinical_notes n
JOIN users u ON u.user_id = n.patient_id
"#;

pub struct NewClinicalNote {
    pub patient_id: i64,
    pub provider_id: i64,
    pub appointment_id: Option<i64>,
    pub note_type: NoteType,
    pub content: String,
    pub diagnosis: Option<String>,
}

pub struct ClinicalNoteRepository;

impl ClinicalNoteRepository {
    pub async fn create(pool: &Pool<Sqlite>, new: NewClinicalNote) -> Result<ClinicalNote, AppError> {
        let now = chrono::Utc::now().timestamp();

        let note_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO clinical_notes (patient_id, provider_id, appointment_id, note_type, content,
                            diagnosis, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
RETURNING note_id
            "#,
        )
        .bind(new.patient_id)
        .bind(new.provider_id)
        .bind(new.appointment_id)
        .bind(new.note_type)
        .bind(&new.content)
        .bind(&new.diagnosis)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Self::get_by_id(pool, note_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created note".to_string()))
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<ClinicalNote>, AppError> {
        let sql = format!("{} WHERE n.note_id = ?", NOTE_SELECT);

        let note = sqlx::query_as::<_, ClinicalNote>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(note)
    }

    /// Newest first; `provider_id` of `None` lists every provider's notes
    pub async fn list(
        pool: &Pool<Sqlite>,
        provider_id: Option<i64>,
        patient_id: Option<i64>,
    ) -> Result<Vec<ClinicalNote>, AppError> {
        let sql = format!(
            r#"{}
WHERE (? IS NULL OR n.provider_id = ?)
  AND (? IS NULL OR n.patient_id = ?)
ORDER BY n.created_at DESC, n.note_id DESC
            "#,
            NOTE_SELECT
        );

        let notes = sqlx::query_as::<_, ClinicalNote>(&sql)
            .bind(provider_id)
            .bind(provider_id)
            .bind(patient_id)
            .bind(patient_id)
            .fetch_all(pool)
            .await?;

        Ok(notes)
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        note_type: Option<NoteType>,
        content: Option<&str>,
        diagnosis: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
UPDATE clinical_notes
SET note_type = COALESCE(?, note_type),
    content = COALESCE(?, content),
    diagnosis = COALESCE(?, diagnosis),
    updated_at = ?
WHERE note_id = ?
            "#,
        )
        .bind(note_type)
        .bind(content)
        .bind(diagnosis)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM clinical_notes WHERE note_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
