use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::models::{Role, User};
use crate::error::AppError;

/// JWT claims carried in the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Auth("Invalid token subject".to_string()))
    }
}

/// Issues and verifies HS256 tokens
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

impl TokenService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    /// Returns the encoded token and its expiry (unix seconds)
    pub fn issue(&self, user: &User) -> Result<(String, i64), AppError> {
        let iat = chrono::Utc::now().timestamp();
        let exp = iat + self.expiry_hours * 3600;

        let claims = Claims {
            sub: user.user_id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iat,
            exp,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Crypto(format!("Token signing failed: {}", e)))?;

        Ok((token, exp))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Auth(format!("Invalid or expired token: {}", e)))
    }
}
