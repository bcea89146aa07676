use std::sync::Arc;
use sqlx::{Pool, Sqlite};
use crate::config::Config;
use crate::crypto::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Pool<Sqlite>, config: Arc<Config>) -> Self {
        let tokens = TokenService::new(&config.jwt_secret, config.jwt_expiry_hours);
        Self {
            db,
            tokens: Arc::new(tokens),
            config,
        }
    }
}
