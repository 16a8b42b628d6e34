//! HS256 access tokens issued by the account service.
//!
//! This service only verifies them; `issue_access_token` exists for local
//! runs and tests.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Lifetime of locally issued tokens (1 hour).
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verify an access token and return the user id it was issued to.
pub fn verify_access_token(token: &str, secret: &str) -> Result<String, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = jsonwebtoken::decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(?e, "access token validation failed");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    if data.claims.sub.is_empty() {
        return Err(ApiError::unauthorized("Token has no subject"));
    }
    Ok(data.claims.sub)
}

/// Strip the `Bearer ` scheme from an `Authorization` value and verify it.
pub fn verify_bearer(header: &str, secret: &str) -> Result<String, ApiError> {
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;
    verify_access_token(token, secret)
}

pub fn issue_access_token(user_id: &str, secret: &str) -> Result<String, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECS,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(?e, "access token signing failed");
        ApiError::internal("Failed to issue token")
    })
}
