//! Password hashing and JWT mint/verify, mirroring
//! `services/auth_service.py`'s bcrypt + PyJWT pairing.

pub mod extract;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{VigilError, VigilResult};

pub fn hash_password(plain: &str) -> VigilResult<String> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST)
        .map_err(|e| VigilError::Validation(format!("could not hash password: {e}")))
}

/// Constant-time comparison is handled inside `bcrypt::verify`.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    bcrypt::verify(plain, hashed).unwrap_or(false)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub fn create_access_token(user_id: &str, secret: &str, expire_minutes: i64) -> VigilResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(expire_minutes)).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| VigilError::Validation(format!("could not mint token: {e}")))
}

/// Returns the subject (user id) if the token is well-formed, signed with
/// `secret`, and unexpired.
pub fn verify_access_token(token: &str, secret: &str) -> Option<String> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .ok()
        .map(|data| data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn token_round_trips_and_rejects_other_secret() {
        let token = create_access_token("user-1", "secret-a", 60).unwrap();
        assert_eq!(verify_access_token(&token, "secret-a"), Some("user-1".to_string()));
        assert_eq!(verify_access_token(&token, "secret-b"), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_access_token("user-1", "secret-a", -1).unwrap();
        assert_eq!(verify_access_token(&token, "secret-a"), None);
    }
}
