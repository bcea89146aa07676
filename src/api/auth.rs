use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::crypto::{hash_password, verify_password};
use crate::db::users::NewUser;
use crate::db::{ProviderProfile, Role, User, UserRepository};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub profile: Option<ProviderProfile>,
}

/// POST /api/auth/register
///
/// Self-registration always creates a patient account; providers and
/// admins are created by an admin through `/api/users`.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    if matches!(req.role, Some(role) if role != Role::Patient) {
        return Err(AppError::Forbidden(
            "Only patient accounts can be self-registered".to_string(),
        ));
    }

    let username = validation::username(&req.username)?;
    let email = validation::email(&req.email)?;
    validation::password(&req.password)?;
    let full_name = validation::required_text("full_name", &req.full_name, 100)?;
    let phone = validation::optional_text("phone", req.phone.as_deref(), 32)?;

    if UserRepository::get_by_login(&state.db, &username).await?.is_some()
        || UserRepository::get_by_login(&state.db, &email).await?.is_some()
    {
        return Err(AppError::Conflict("Username or email already registered".to_string()));
    }

    let password_hash = hash_password(&req.password)?;

    let user = UserRepository::create(
        &state.db,
        NewUser {
            username,
            email,
            password_hash,
            full_name,
            role: Role::Patient,
            phone,
        },
        None,
    )
    .await?;

    let (token, expires_at) = state.tokens.issue(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            expires_at,
            user,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = UserRepository::get_by_login(&state.db, &req.login)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = user.user_id, "failed login attempt");
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    if !user.is_active {
        return Err(AppError::Auth("Account is deactivated".to_string()));
    }

    UserRepository::record_login(&state.db, user.user_id).await?;
    let (token, expires_at) = state.tokens.issue(&user)?;

    Ok(Json(AuthResponse {
        token,
        expires_at,
        user,
    }))
}

/// GET /api/auth/me (requires auth via middleware)
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MeResponse>, AppError> {
    let user = UserRepository::get_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let profile = if user.role.is_provider() {
        UserRepository::get_profile(&state.db, user.user_id).await?
    } else {
        None
    };

    Ok(Json(MeResponse { user, profile }))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    let user = UserRepository::get_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(AppError::Auth("Current password is incorrect".to_string()));
    }
    validation::password(&req.new_password)?;

    let password_hash = hash_password(&req.new_password)?;
    UserRepository::update_password(&state.db, user.user_id, &password_hash).await?;
    tracing::info!(user_id = user.user_id, "password changed");

    Ok(StatusCode::NO_CONTENT)
}
