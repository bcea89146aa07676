use axum::{extract::State, Extension, Json};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::db::analytics::Analytics;
use crate::db::AnalyticsRepository;
use crate::error::AppError;

/// GET /api/admin/analytics (admin)
pub async fn analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Analytics>, AppError> {
    auth.require_admin()?;

    let analytics = AnalyticsRepository::collect(&state.db).await?;
    Ok(Json(analytics))
}
