use sqlx::{Pool, Sqlite};

use crate::db::models::{ProviderProfile, ProviderSummary, Role, User};
use crate::error::AppError;

/// Validated input for a new account
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub struct UserRepository;

impl UserRepository {
    /// Insert the user and, for providers, their profile row in one transaction
    pub async fn create(
        pool: &Pool<Sqlite>,
        new_user: NewUser,
        profile: Option<ProviderProfile>,
    ) -> Result<User, AppError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
INSERT INTO users (username, email, password_hash, full_name, role, phone, is_active, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
RETURNING *
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.full_name)
        .bind(new_user.role)
        .bind(&new_user.phone)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if user.role.is_provider() {
            let profile = profile.unwrap_or_default();
            sqlx::query(
                r#"
INSERT INTO provider_profiles (user_id, specialization, license_number, bio, years_experience)
VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(user.user_id)
            .bind(&profile.specialization)
            .bind(&profile.license_number)
            .bind(&profile.bio)
            .bind(profile.years_experience)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(user_id = user.user_id, role = user.role.as_str(), "user created");

        Ok(user)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Look a user up by username or email, both stored lowercased
    pub async fn get_by_login(pool: &Pool<Sqlite>, login: &str) -> Result<Option<User>, AppError> {
        let login = login.trim().to_lowercase();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? OR email = ?")
            .bind(&login)
            .bind(&login)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    pub async fn list(pool: &Pool<Sqlite>, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let pattern = filter.search.as_ref().map(|s| format!("%{}%", s.trim()));

        let users = sqlx::query_as::<_, User>(
            r#"
SELECT * FROM users
WHERE (? IS NULL OR role = ?)
  AND (? IS NULL OR is_active = ?)
  AND (? IS NULL OR full_name LIKE ? OR username LIKE ? OR email LIKE ?)
ORDER BY created_at DESC, user_id DESC
            "#,
        )
        .bind(filter.role)
        .bind(filter.role)
        .bind(filter.active)
        .bind(filter.active)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// Apply admin changes; a promotion to a provider role gets an empty profile
    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        changes: UserChanges,
    ) -> Result<Option<User>, AppError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
UPDATE users
SET full_name = COALESCE(?, full_name),
    phone = COALESCE(?, phone),
    role = COALESCE(?, role),
    is_active = COALESCE(?, is_active),
    updated_at = ?
WHERE user_id = ?
RETURNING *
            "#,
        )
        .bind(&changes.full_name)
        .bind(&changes.phone)
        .bind(changes.role)
        .bind(changes.is_active)
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user) = &user {
            if user.role.is_provider() {
                sqlx::query("INSERT OR IGNORE INTO provider_profiles (user_id) VALUES (?)")
                    .bind(user.user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(user)
    }

    pub async fn update_password(
        pool: &Pool<Sqlite>,
        id: i64,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE user_id = ?")
            .bind(password_hash)
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn record_login(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE user_id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Returns false when no such user existed
    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_profile(
        pool: &Pool<Sqlite>,
        user_id: i64,
    ) -> Result<Option<ProviderProfile>, AppError> {
        let profile =
            sqlx::query_as::<_, ProviderProfile>("SELECT * FROM provider_profiles WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(profile)
    }

    pub async fn upsert_profile(
        pool: &Pool<Sqlite>,
        user_id: i64,
        profile: &ProviderProfile,
    ) -> Result<ProviderProfile, AppError> {
        let profile = sqlx::query_as::<_, ProviderProfile>(
            r#"
INSERT INTO provider_profiles (user_id, specialization, license_number, bio, years_experience)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT (user_id) DO UPDATE SET
    specialization = excluded.specialization,
    license_number = excluded.license_number,
    bio = excluded.bio,
    years_experience = excluded.years_experience
RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&profile.specialization)
        .bind(&profile.license_number)
        .bind(&profile.bio)
        .bind(profile.years_experience)
        .fetch_one(pool)
        .await?;

        Ok(profile)
    }

    pub async fn update_contact(
        pool: &Pool<Sqlite>,
        id: i64,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
UPDATE users
SET full_name = COALESCE(?, full_name),
    phone = COALESCE(?, phone),
    updated_at = ?
WHERE user_id = ?
RETURNING *
            "#,
        )
        .bind(full_name)
        .bind(phone)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Active providers, optionally narrowed to one role and a name search
    pub async fn list_providers(
        pool: &Pool<Sqlite>,
        role: Option<Role>,
        search: Option<&str>,
    ) -> Result<Vec<ProviderSummary>, AppError> {
        let pattern = search.map(|s| format!("%{}%", s.trim()));

        let providers = sqlx::query_as::<_, ProviderSummary>(
            r#"
SELECT u.user_id, u.username, u.full_name, u.email, u.role,
       p.specialization, p.bio, p.years_experience
FROM users u
LEFT JOIN provider_profiles p ON p.user_id = u.user_id
WHERE u.role IN ('psychiatrist', 'counselor')
  AND u.is_active = 1
  AND (? IS NULL OR u.role = ?)
  AND (? IS NULL OR u.full_name LIKE ? OR p.specialization LIKE ?)
ORDER BY u.full_name
            "#,
        )
        .bind(role)
        .bind(role)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

        Ok(providers)
    }

    pub async fn admin_exists(pool: &Pool<Sqlite>) -> Result<bool, AppError> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(pool)
                .await?;

        Ok(exists >= 1)
    }
}
