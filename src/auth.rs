use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::repo::{IdentityRepo, RepoError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // the authenticated handle
    pub exp: usize,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hash failure: {e}"))?;
    Ok(digest.to_string())
}

pub fn verify_password(digest: &str, password: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Anything that parses as a PHC string counts as hashed; everything else is
/// treated as a legacy plaintext credential.
pub fn is_hashed_digest(digest: &str) -> bool {
    PasswordHash::new(digest).is_ok()
}

/// Check a handle/password pair against the store. Legacy plaintext rows are
/// compared directly and, on a match, silently rewritten to an argon2
/// digest. The rewrite is best-effort: a failed rewrite never fails the
/// login itself.
pub async fn verify_login<R: IdentityRepo + ?Sized>(
    repo: &R,
    handle: &str,
    password: &str,
) -> Result<bool, RepoError> {
    let identity = match repo.get_identity(handle).await {
        Ok(identity) => identity,
        Err(RepoError::NotFound) => return Ok(false),
        Err(e) => return Err(e),
    };
    if is_hashed_digest(&identity.digest) {
        return Ok(verify_password(&identity.digest, password));
    }
    // legacy plaintext row
    if identity.digest != password {
        return Ok(false);
    }
    match hash_password(password) {
        Ok(digest) => {
            if let Err(e) = repo.replace_digest(handle, &digest).await {
                log::warn!("legacy digest rewrite failed for '{handle}': {e}");
            }
        }
        Err(e) => log::warn!("legacy digest rehash failed for '{handle}': {e}"),
    }
    Ok(true)
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(_) => return ready(Err(actix_web::error::ErrorUnauthorized("Invalid JWT"))),
            }
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "Authorization required",
        )))
    }
}

/// Create a JWT for an authenticated handle.
pub fn create_jwt(handle: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims { sub: handle.to_string(), exp: expiration };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrip() {
        let digest = hash_password("open sesame").unwrap();
        assert!(is_hashed_digest(&digest));
        assert!(verify_password(&digest, "open sesame"));
        assert!(!verify_password(&digest, "wrong"));
    }

    #[test]
    fn plaintext_is_not_a_digest() {
        assert!(!is_hashed_digest("hunter2"));
        assert!(!verify_password("hunter2", "hunter2"));
    }
}
