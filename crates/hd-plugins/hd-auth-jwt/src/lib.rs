//! # hd-auth-jwt
//!
//! Argon2 password hashing and HS256 bearer tokens behind `AuthProvider`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use hd_core::error::{AppError, Result};
use hd_core::models::{Identity, Role};
use hd_core::traits::AuthProvider;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Token payload. `sub` carries the numeric user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    role: Role,
    iat: i64,
    exp: i64,
}

pub struct JwtAuthProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthProvider {
    /// `ttl` is how long an issued token stays valid.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    fn claims_for(&self, identity: &Identity) -> Claims {
        let now = Utc::now();
        Claims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            role: identity.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        }
    }
}

#[async_trait]
impl AuthProvider for JwtAuthProvider {
    async fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn issue_token(&self, identity: &Identity) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), &self.claims_for(identity), &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
    }

    fn verify_token(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Unauthorized("token expired".into()),
            _ => AppError::Unauthorized("invalid token".into()),
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("invalid token subject".into()))?;

        Ok(Identity { user_id, email: data.claims.email, role: data.claims.role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> JwtAuthProvider {
        JwtAuthProvider::new("test-secret", Duration::hours(24))
    }

    fn admin() -> Identity {
        Identity { user_id: 42, email: "admin@example.com".into(), role: Role::Admin }
    }

    #[tokio::test]
    async fn password_hash_verifies_only_the_original() {
        let auth = provider();
        let hash = auth.hash_password("S3cret!pass").await.unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(auth.verify_password("S3cret!pass", &hash).await);
        assert!(!auth.verify_password("wrong", &hash).await);
        assert!(!auth.verify_password("S3cret!pass", "not-a-hash").await);
    }

    #[test]
    fn token_carries_identity() {
        let auth = provider();
        let token = auth.issue_token(&admin()).unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), admin());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = JwtAuthProvider::new("other", Duration::hours(1)).issue_token(&admin()).unwrap();
        assert!(matches!(provider().verify_token(&token), Err(AppError::Unauthorized(_))));
        assert!(matches!(provider().verify_token("garbage"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = JwtAuthProvider::new("test-secret", Duration::seconds(-120));
        let token = auth.issue_token(&admin()).unwrap();
        let err = auth.verify_token(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "token expired"));
    }
}
