use chrono::NaiveDate;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{Pool, Sqlite};

use crate::db::models::MoodEntry;
use crate::error::AppError;

/// Entries needed before a trend is reported
const MIN_TREND_ENTRIES: usize = 4;
/// Mean mood change (on the 1-10 scale) below which the trend is stable
const TREND_THRESHOLD: f64 = 0.5;

pub struct NewMoodEntry {
    pub patient_id: i64,
    pub entry_date: NaiveDate,
    pub mood_score: i64,
    pub anxiety_level: Option<i64>,
    pub energy_level: Option<i64>,
    pub sleep_hours: Option<f64>,
    pub activities: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodTrend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodSummary {
    pub entries: usize,
    pub average_mood: Option<f64>,
    pub average_anxiety: Option<f64>,
    pub average_energy: Option<f64>,
    pub average_sleep: Option<f64>,
    pub trend: MoodTrend,
}

impl MoodSummary {
    /// Summarize entries given in any order
    pub fn from_entries(entries: &[MoodEntry]) -> Self {
        let mut ordered: Vec<&MoodEntry> = entries.iter().collect();
        ordered.sort_by_key(|e| (e.entry_date, e.entry_id));

        let moods: Vec<f64> = ordered.iter().map(|e| e.mood_score as f64).collect();

        MoodSummary {
            entries: entries.len(),
            average_mood: mean(moods.iter().copied()),
            average_anxiety: mean(ordered.iter().filter_map(|e| e.anxiety_level).map(|v| v as f64)),
            average_energy: mean(ordered.iter().filter_map(|e| e.energy_level).map(|v| v as f64)),
            average_sleep: mean(ordered.iter().filter_map(|e| e.sleep_hours)),
            trend: trend(&moods),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Compare the older half of the series with the newer half
fn trend(chronological: &[f64]) -> MoodTrend {
    if chronological.len() < MIN_TREND_ENTRIES {
        return MoodTrend::InsufficientData;
    }

    let half = chronological.len() / 2;
    let older = mean(chronological[..half].iter().copied()).unwrap_or_default();
    let newer = mean(chronological[chronological.len() - half..].iter().copied()).unwrap_or_default();
    let delta = newer - older;

    if delta >= TREND_THRESHOLD {
        MoodTrend::Improving
    } else if delta <= -TREND_THRESHOLD {
        MoodTrend::Declining
    } else {
        MoodTrend::Stable
    }
}

pub struct MoodRepository;

impl MoodRepository {
    pub async fn create(pool: &Pool<Sqlite>, new: NewMoodEntry) -> Result<MoodEntry, AppError> {
        let entry = sqlx::query_as::<_, MoodEntry>(
            r#"
INSERT INTO mood_entries (patient_id, entry_date, mood_score, anxiety_level, energy_level,
                          sleep_hours, activities, notes, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(new.patient_id)
        .bind(new.entry_date)
        .bind(new.mood_score)
        .bind(new.anxiety_level)
        .bind(new.energy_level)
        .bind(new.sleep_hours)
        .bind(Json(&new.activities))
        .bind(&new.notes)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(pool)
        .await?;

        Ok(entry)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<MoodEntry>, AppError> {
        let entry = sqlx::query_as::<_, MoodEntry>("SELECT * FROM mood_entries WHERE entry_id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(entry)
    }

    /// Entries dated on or after `since`, newest first
    pub async fn list_since(
        pool: &Pool<Sqlite>,
        patient_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<MoodEntry>, AppError> {
        let entries = sqlx::query_as::<_, MoodEntry>(
            r#"
SELECT * FROM mood_entries
WHERE patient_id = ? AND entry_date >= ?
ORDER BY entry_date DESC, entry_id DESC
            "#,
        )
        .bind(patient_id)
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM mood_entries WHERE entry_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
