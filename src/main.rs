use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Pool, Sqlite};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mindcare_portal::{
    api::{create_router, validation, AppState, RateLimiter},
    config::{BootstrapAdmin, Config},
    crypto::hash_password,
    db::{self, users::NewUser, Role, UserRepository},
    error::AppError,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mindcare_portal=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MindCare portal v{}...", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env()?);
    tracing::info!("Configuration loaded");

    let db = db::connect(&config).await?;
    tracing::info!("Database connected and migrated: {}", config.database_url);

    if let Some(admin) = &config.bootstrap_admin {
        ensure_admin(&db, admin).await?;
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tracing::info!("Upload directory ready: {}", config.upload_dir);

    // Applies to register and login only
    let rate_limiter = Arc::new(RateLimiter::new(config.auth_rate_limit_per_minute, 60));
    tracing::info!(
        "Auth rate limiter configured ({} req/min per IP)",
        config.auth_rate_limit_per_minute
    );

    {
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                tracing::debug!("Rate limiter cache cleaned up");
            }
        });
    }

    let state = AppState::new(db, config.clone());
    let app = create_router(state, rate_limiter);

    let addr = config.server_address();
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/api/health", addr);
    tracing::info!("API areas:");
    tracing::info!("  /api/auth/*            - register, login, me, change-password");
    tracing::info!("  /api/users, /api/profile, /api/providers");
    tracing::info!("  /api/appointments      - booking and status workflow");
    tracing::info!("  /api/messages          - patient/provider conversations");
    tracing::info!("  /api/mood              - mood tracking and summary");
    tracing::info!("  /api/community         - forum posts, comments, likes");
    tracing::info!("  /api/resources         - library with file upload/download");
    tracing::info!("  /api/clinical-notes, /api/treatment-plans");
    tracing::info!("  /api/admin/analytics");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Create the configured admin account unless an admin already exists
async fn ensure_admin(db: &Pool<Sqlite>, admin: &BootstrapAdmin) -> Result<(), AppError> {
    if UserRepository::admin_exists(db).await? {
        tracing::debug!("Admin account present, skipping bootstrap");
        return Ok(());
    }

    validation::password(&admin.password)?;

    let user = UserRepository::create(
        db,
        NewUser {
            username: validation::username(&admin.username)?,
            email: validation::email(&admin.email)?,
            password_hash: hash_password(&admin.password)?,
            full_name: "Administrator".to_string(),
            role: Role::Admin,
            phone: None,
        },
        None,
    )
    .await?;

    tracing::info!(user_id = user.user_id, "Bootstrap admin account created");
    Ok(())
}
