use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};

use crate::db::models::{PlanStatus, TreatmentPlan};
use crate::error::AppError;

const PLAN_SELECT: &str = r#"
SELECT t.plan_id, t.patient_id, pu.full_name AS patient_name,
       t.provider_id, du.full_name AS provider_name,
       t.title, t.diagnosis, t.goals, t.interventions, t.start_date, t.end_date,
       t.status, t.created_at, t.updated_at
FROM treatment_plans t
JOIN users pu ON pu.user_id = t.patient_id
JOIN users du ON du.user_id = t.provider_id
"#;

pub struct NewTreatmentPlan {
    pub patient_id: i64,
    pub provider_id: i64,
    pub title: String,
    pub diagnosis: Option<String>,
    pub goals: String,
    pub interventions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default)]
pub struct PlanChanges {
    pub title: Option<String>,
    pub diagnosis: Option<String>,
    pub goals: Option<String>,
    pub interventions: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlanScope {
    pub patient_id: Option<i64>,
    pub provider_id: Option<i64>,
}

pub struct TreatmentPlanRepository;

impl TreatmentPlanRepository {
    pub async fn create(pool: &Pool<Sqlite>, new: NewTreatmentPlan) -> Result<TreatmentPlan, AppError> {
        let now = chrono::Utc::now().timestamp();

        let plan_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO treatment_plans (patient_id, provider_id, title, diagnosis, goals, interventions,
                             start_date, end_date, status, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
RETURNING plan_id
            "#,
        )
        .bind(new.patient_id)
        .bind(new.provider_id)
        .bind(&new.title)
        .bind(&new.diagnosis)
        .bind(&new.goals)
        .bind(&new.interventions)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Self::get_by_id(pool, plan_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created treatment plan".to_string()))
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<TreatmentPlan>, AppError> {
        let sql = format!("{} WHERE t.plan_id = ?", PLAN_SELECT);

        let plan = sqlx::query_as::<_, TreatmentPlan>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(plan)
    }

    pub async fn list(
        pool: &Pool<Sqlite>,
        scope: PlanScope,
        status: Option<PlanStatus>,
    ) -> Result<Vec<TreatmentPlan>, AppError> {
        let sql = format!(
            r#"{}
WHERE (? IS NULL OR t.patient_id = ?)
  AND (? IS NULL OR t.provider_id = ?)
  AND (? IS NULL OR t.status = ?)
ORDER BY t.start_date DESC, t.plan_id DESC
            "#,
            PLAN_SELECT
        );

        let plans = sqlx::query_as::<_, TreatmentPlan>(&sql)
            .bind(scope.patient_id)
            .bind(scope.patient_id)
            .bind(scope.provider_id)
            .bind(scope.provider_id)
            .bind(status)
            .bind(status)
            .fetch_all(pool)
            .await?;

        Ok(plans)
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, changes: PlanChanges) -> Result<(), AppError> {
        sqlx::query(
            r#"
UPDATE treatment_plans
SET title = COALESCE(?, title),
    diagnosis = COALESCE(?, diagnosis),
    goals = COALESCE(?, goals),
    interventions = COALESCE(?, interventions),
    end_date = COALESCE(?, end_date),
    status = COALESCE(?, status),
    updated_at = ?
WHERE plan_id = ?
            "#,
        )
        .bind(&changes.title)
        .bind(&changes.diagnosis)
        .bind(&changes.goals)
        .bind(&changes.interventions)
        .bind(changes.end_date)
        .bind(changes.status)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM treatment_plans WHERE plan_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
