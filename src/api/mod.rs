pub mod admin;
pub mod appointments;
pub mod auth;
pub mod clinical;
pub mod community;
pub mod messages;
pub mod middleware;
pub mod mood;
pub mod resources;
pub mod state;
pub mod users;
pub mod validation;

pub use middleware::{AuthUser, RateLimiter};
pub use state::AppState;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::db;

// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
}

pub fn create_router(state: AppState, rate_limiter: Arc<RateLimiter>) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    // Credential endpoints are rate limited per client IP
    let public = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .layer(axum_middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            middleware::rate_limit_middleware(limiter, req, next)
        }))
        .route("/api/health", get(health));

    let protected = Router::new()
        // Account
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/change-password", post(auth::change_password))
        .route("/api/profile", put(users::update_profile))
        .route("/api/providers", get(users::list_providers))
        // User administration
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        // Appointments
        .route(
            "/api/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/api/appointments/:id",
            get(appointments::get_appointment)
                .patch(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        // Messaging
        .route("/api/messages", post(messages::send_message))
        .route("/api/messages/conversations", get(messages::list_conversations))
        .route(
            "/api/messages/conversations/:id",
            get(messages::get_conversation_messages),
        )
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/:id/read", patch(messages::mark_message_read))
        // Mood tracking
        .route("/api/mood", get(mood::list_entries).post(mood::create_entry))
        .route("/api/mood/summary", get(mood::summary))
        .route("/api/mood/:id", delete(mood::delete_entry))
        // Community
        .route(
            "/api/community/posts",
            get(community::list_posts).post(community::create_post),
        )
        .route(
            "/api/community/posts/:id",
            get(community::get_post)
                .put(community::update_post)
                .delete(community::delete_post),
        )
        .route("/api/community/posts/:id/comments", post(community::add_comment))
        .route("/api/community/posts/:id/like", post(community::toggle_like))
        .route("/api/community/comments/:id", delete(community::delete_comment))
        // Resources
        .route(
            "/api/resources",
            get(resources::list_resources).post(resources::create_resource),
        )
        .route(
            "/api/resources/:id",
            get(resources::get_resource)
                .put(resources::update_resource)
                .delete(resources::delete_resource),
        )
        .route(
            "/api/resources/:id/file",
            post(resources::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/resources/:id/download", get(resources::download_file))
        // Clinical records
        .route(
            "/api/clinical-notes",
            get(clinical::list_notes).post(clinical::create_note),
        )
        .route(
            "/api/clinical-notes/:id",
            get(clinical::get_note)
                .put(clinical::update_note)
                .delete(clinical::delete_note),
        )
        .route(
            "/api/treatment-plans",
            get(clinical::list_plans).post(clinical::create_plan),
        )
        .route(
            "/api/treatment-plans/:id",
            get(clinical::get_plan)
                .put(clinical::update_plan)
                .delete(clinical::delete_plan),
        )
        // Admin
        .route("/api/admin/analytics", get(admin::analytics))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if db::ping(&state.db).await { "up" } else { "down" };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}
