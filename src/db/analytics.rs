use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{Pool, Sqlite};

use crate::db::models::{AppointmentStatus, Role};
use crate::error::AppError;

const WINDOW_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub by_role: BTreeMap<&'static str, i64>,
    pub new_last_30_days: i64,
}

#[derive(Debug, Serialize)]
pub struct AppointmentStats {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    pub upcoming: i64,
}

#[derive(Debug, Serialize)]
pub struct CommunityStats {
    pub posts: i64,
    pub comments: i64,
}

#[derive(Debug, Serialize)]
pub struct MoodStats {
    pub entries_last_30_days: i64,
    pub average_mood_last_30_days: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ResourceStats {
    pub total: i64,
    pub published: i64,
}

#[derive(Debug, Serialize)]
pub struct Analytics {
    pub users: UserStats,
    pub appointments: AppointmentStats,
    pub messages_last_30_days: i64,
    pub community: CommunityStats,
    pub mood: MoodStats,
    pub resources: ResourceStats,
}

pub struct AnalyticsRepository;

impl AnalyticsRepository {
    pub async fn collect(pool: &Pool<Sqlite>) -> Result<Analytics, AppError> {
        let now = chrono::Utc::now();
        let since = now.timestamp() - WINDOW_SECS;
        let since_date = (now - chrono::Duration::days(30)).date_naive();
        let today = now.date_naive();

        let (total_users, active_users, new_users): (i64, i64, i64) = sqlx::query_as(
            r#"
SELECT COUNT(*),
       COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0),
       COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0)
FROM users
            "#,
        )
        .bind(since)
        .fetch_one(pool)
        .await?;

        let role_rows: Vec<(Role, i64)> =
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
                .fetch_all(pool)
                .await?;
        let mut by_role: BTreeMap<&'static str, i64> =
            Role::ALL.iter().map(|r| (r.as_str(), 0)).collect();
        for (role, count) in role_rows {
            by_role.insert(role.as_str(), count);
        }

        let status_rows: Vec<(AppointmentStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM appointments GROUP BY status")
                .fetch_all(pool)
                .await?;
        let mut by_status: BTreeMap<&'static str, i64> =
            AppointmentStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for (status, count) in status_rows {
            by_status.insert(status.as_str(), count);
        }

        let upcoming: i64 = sqlx::query_scalar(
            r#"
SELECT COUNT(*) FROM appointments
WHERE appointment_date >= ? AND status IN ('pending', 'confirmed')
            "#,
        )
        .bind(today)
        .fetch_one(pool)
        .await?;

        let messages_last_30_days: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE created_at >= ?")
                .bind(since)
                .fetch_one(pool)
                .await?;

        let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM community_posts")
            .fetch_one(pool)
            .await?;
        let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_comments")
            .fetch_one(pool)
            .await?;

        let (mood_entries, average_mood): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(CAST(mood_score AS REAL)) FROM mood_entries WHERE entry_date >= ?",
        )
        .bind(since_date)
        .fetch_one(pool)
        .await?;

        let (total_resources, published): (i64, i64) = sqlx::query_as(
            r#"
SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_published = 1 THEN 1 ELSE 0 END), 0)
FROM resources
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(Analytics {
            users: UserStats {
                total: total_users,
                active: active_users,
                by_role,
                new_last_30_days: new_users,
            },
            appointments: AppointmentStats {
                total: by_status.values().sum(),
                by_status,
                upcoming,
            },
            messages_last_30_days,
            community: CommunityStats { posts, comments },
            mood: MoodStats {
                entries_last_30_days: mood_entries,
                average_mood_last_30_days: average_mood,
            },
            resources: ResourceStats {
                total: total_resources,
                published,
            },
        })
    }
}
