use std::str::FromStr;

use crate::error::AppError;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    pub auth_rate_limit_per_minute: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Credentials for the admin account created on first start.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::Config(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }

        let bootstrap_admin = match (
            std::env::var("ADMIN_USERNAME"),
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(BootstrapAdmin {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_var("SERVER_PORT", "8080")?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://mindcare.db?mode=rwc".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            jwt_secret,
            jwt_expiry_hours: parse_var("JWT_EXPIRY_HOURS", "24")?,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", "10485760")?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30")?,
            auth_rate_limit_per_minute: parse_var("AUTH_RATE_LIMIT_PER_MINUTE", "20")?,
            bootstrap_admin,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e)))
}
