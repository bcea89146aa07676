use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::crypto::hash_password;
use crate::db::users::{NewUser, UserChanges, UserFilter};
use crate::db::{ProviderProfile, ProviderSummary, Role, User, UserRepository};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub profile: Option<ProviderProfile>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub profile: Option<ProviderProfile>,
}

#[derive(Debug, Deserialize)]
pub struct ProvidersQuery {
    pub role: Option<Role>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub profile: Option<ProviderProfile>,
}

fn validate_profile(profile: ProviderProfile) -> Result<ProviderProfile, AppError> {
    if matches!(profile.years_experience, Some(years) if !(0..=80).contains(&years)) {
        return Err(AppError::Validation(
            "years_experience must be between 0 and 80".to_string(),
        ));
    }

    Ok(ProviderProfile {
        user_id: profile.user_id,
        specialization: validation::optional_text("specialization", profile.specialization.as_deref(), 100)?,
        license_number: validation::optional_text("license_number", profile.license_number.as_deref(), 64)?,
        bio: validation::optional_text("bio", profile.bio.as_deref(), 2000)?,
        years_experience: profile.years_experience,
    })
}

/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    auth.require_admin()?;

    let users = UserRepository::list(
        &state.db,
        &UserFilter {
            role: query.role,
            active: query.active,
            search: query.search.filter(|s| !s.trim().is_empty()),
        },
    )
    .await?;

    Ok(Json(users))
}

/// POST /api/users (admin)
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserDetail>), AppError> {
    auth.require_admin()?;

    let username = validation::username(&req.username)?;
    let email = validation::email(&req.email)?;
    validation::password(&req.password)?;
    let full_name = validation::required_text("full_name", &req.full_name, 100)?;
    let phone = validation::optional_text("phone", req.phone.as_deref(), 32)?;
    let profile = req.profile.map(validate_profile).transpose()?;

    let password_hash = hash_password(&req.password)?;

    // Unique constraints on username/email surface as 409
    let user = UserRepository::create(
        &state.db,
        NewUser {
            username,
            email,
            password_hash,
            full_name,
            role: req.role,
            phone,
        },
        profile,
    )
    .await?;

    let profile = UserRepository::get_profile(&state.db, user.user_id).await?;
    tracing::info!(admin_id = auth.user_id, user_id = user.user_id, "admin created user");

    Ok((StatusCode::CREATED, Json(UserDetail { user, profile })))
}

/// GET /api/users/:id (admin or self)
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<UserDetail>, AppError> {
    if !auth.is_admin() && auth.user_id != id {
        return Err(AppError::Forbidden("Cannot view other users".to_string()));
    }

    let user = UserRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let profile = UserRepository::get_profile(&state.db, id).await?;

    Ok(Json(UserDetail { user, profile }))
}

/// PATCH /api/users/:id (admin)
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    auth.require_admin()?;

    if id == auth.user_id
        && (req.is_active == Some(false) || matches!(req.role, Some(role) if role != Role::Admin))
    {
        return Err(AppError::Validation(
            "Admins cannot deactivate or demote themselves".to_string(),
        ));
    }

    let changes = UserChanges {
        full_name: req
            .full_name
            .as_deref()
            .map(|name| validation::required_text("full_name", name, 100))
            .transpose()?,
        phone: validation::optional_text("phone", req.phone.as_deref(), 32)?,
        role: req.role,
        is_active: req.is_active,
    };

    let user = UserRepository::update(&state.db, id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    tracing::info!(admin_id = auth.user_id, user_id = id, "admin updated user");

    Ok(Json(user))
}

/// DELETE /api/users/:id (admin)
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    if id == auth.user_id {
        return Err(AppError::Validation("Admins cannot delete themselves".to_string()));
    }

    if !UserRepository::delete(&state.db, id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!(admin_id = auth.user_id, user_id = id, "admin deleted user");

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/profile (self)
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserDetail>, AppError> {
    let full_name = req
        .full_name
        .as_deref()
        .map(|name| validation::required_text("full_name", name, 100))
        .transpose()?;
    let phone = validation::optional_text("phone", req.phone.as_deref(), 32)?;

    let user = UserRepository::update_contact(&state.db, auth.user_id, full_name.as_deref(), phone.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let profile = match req.profile {
        Some(profile) if user.role.is_provider() => {
            let profile = validate_profile(profile)?;
            Some(UserRepository::upsert_profile(&state.db, user.user_id, &profile).await?)
        }
        Some(_) => {
            return Err(AppError::Validation(
                "Only providers have a professional profile".to_string(),
            ))
        }
        None => UserRepository::get_profile(&state.db, user.user_id).await?,
    };

    Ok(Json(UserDetail { user, profile }))
}

/// GET /api/providers
pub async fn list_providers(
    State(state): State<AppState>,
    Query(query): Query<ProvidersQuery>,
) -> Result<Json<Vec<ProviderSummary>>, AppError> {
    if matches!(query.role, Some(role) if !role.is_provider()) {
        return Err(AppError::Validation(
            "role must be psychiatrist or counselor".to_string(),
        ));
    }

    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());
    let providers = UserRepository::list_providers(&state.db, query.role, search).await?;

    Ok(Json(providers))
}
