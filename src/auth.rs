//! Request authentication
//!
//! The core only needs to know *who* is acting. `AuthProvider` turns request
//! headers into a user id; handlers that require a caller take an `AuthUser`
//! argument, which runs the provider and rejects the request with 401 when it
//! fails. Handlers without that argument stay public.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::AppError;

pub trait AuthProvider: Send + Sync {
    /// Returns the id of the acting user or `Unauthenticated`.
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, AppError>;
}

/// Claims carried by bearer tokens issued at login.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// Verifies HS256 bearer tokens signed with the shared secret.
pub struct JwtAuth {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl AuthProvider for JwtAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, AppError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        let claims = decode::<Claims>(token.trim(), &self.decoding_key, &self.validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected bearer token");
                AppError::Unauthenticated
            })?
            .claims;

        if !is_valid_user_id(&claims.id) {
            return Err(AppError::Unauthenticated);
        }

        Ok(claims.id)
    }
}

/// User ids end up as segments of composite index keys, so they are limited
/// to characters that can never collide with the `:` separator.
pub fn is_valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = state.auth.authenticate(&parts.headers)?;
        Ok(AuthUser { id })
    }
}
