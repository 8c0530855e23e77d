//! Bearer credentials: JWT issuance/verification and password hashing.
//!
//! Tokens are HS256 with a `sub` claim carrying the user id and a 30-minute
//! expiry. Stored passwords are salt-prefixed hex SHA-256
//! (`<salt>$<digest>`).

use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Access token lifetime.
pub const TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Issue an access token for `user_id`.
pub fn create_access_token(user_id: i64, secret: &str) -> Result<String> {
    let expires = Utc::now() + Duration::minutes(TOKEN_TTL_MINUTES);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expires.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| {
        tracing::error!("Token encoding failed: {err}");
        Error::internal("Token issuance failed")
    })
}

/// Verify a bearer token and extract the subject user id.
///
/// Any failure (bad signature, expiry, malformed subject) collapses to
/// `Unauthenticated`; callers never learn which check failed.
pub fn verify_token(token: &str, secret: &str) -> Result<i64> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| Error::Unauthenticated)?;

    data.claims
        .sub
        .parse::<i64>()
        .map_err(|_| Error::Unauthenticated)
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);
    format!("{}${}", salt_hex, digest(&salt_hex, password))
}

/// Check a password against a stored `<salt>$<digest>` hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    digest(salt, password) == expected
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "no-separator"));
    }

    #[test]
    fn token_round_trip() {
        let token = create_access_token(42, "secret").unwrap();
        assert_eq!(verify_token(&token, "secret").unwrap(), 42);
    }

    #[test]
    fn wrong_secret_is_unauthenticated() {
        let token = create_access_token(42, "secret").unwrap();
        assert!(matches!(
            verify_token(&token, "other"),
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn garbage_token_is_unauthenticated() {
        assert!(matches!(
            verify_token("not.a.token", "secret"),
            Err(Error::Unauthenticated)
        ));
    }
}
