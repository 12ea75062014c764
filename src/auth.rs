//! Password hashing and bearer tokens for the account service.

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::account::User;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("password hashing failed: {}", err))?;
    Ok(hash.to_string())
}

/// `false` for a wrong password and for a hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub user_id: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 token issuer/validator sharing one secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expire_minutes: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, expire_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expire_minutes,
        }
    }

    /// Lifetime of an issued token in seconds.
    pub fn expires_in(&self) -> i64 {
        self.expire_minutes * 60
    }

    pub fn issue(&self, user: &User) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.username.clone(),
            user_id: user.id.clone(),
            role: user.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.expire_minutes)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| ServiceError::Internal(anyhow!("failed to sign token: {}", err)))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ServiceError::Unauthorized("could not validate credentials".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::UserRole;

    fn user() -> User {
        User {
            id: "5f2b".into(),
            username: "dr.house".into(),
            email: None,
            full_name: Some("Gregory House".into()),
            role: UserRole::Physician,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn token_round_trip() {
        let issuer = TokenIssuer::new("test-secret", 480);
        let token = issuer.issue(&user()).unwrap();
        let claims = issuer.decode(&token).unwrap();
        assert_eq!(claims.sub, "dr.house");
        assert_eq!(claims.role, "physician");
        assert_eq!(claims.exp - claims.iat, 480 * 60);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenIssuer::new("one", 10).issue(&user()).unwrap();
        assert!(matches!(
            TokenIssuer::new("two", 10).decode(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Well past the default validation leeway.
        let issuer = TokenIssuer::new("secret", -10);
        let token = issuer.issue(&user()).unwrap();
        assert!(issuer.decode(&token).is_err());
    }
}
