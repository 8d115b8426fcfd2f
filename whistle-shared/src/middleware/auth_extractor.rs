use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{Claims, StaffUser};

/// Router state that knows the secret staff tokens are signed with.
pub trait JwtSecret {
    fn jwt_secret(&self) -> &str;
}

impl<T: JwtSecret> JwtSecret for Arc<T> {
    fn jwt_secret(&self) -> &str {
        (**self).jwt_secret()
    }
}

/// Staff requests carry `Authorization: Bearer <jwt>`; anything else is
/// rejected before the handler runs.
#[axum::async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    S: JwtSecret + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError::new(ErrorCode::Unauthorized, "a staff bearer token is required")
        })?;
        let claims = validate_jwt(token, state.jwt_secret())?;
        Ok(StaffUser::from(claims))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Decode an HS256 staff token. Expiry is enforced by the decoder.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
            Err(AppError::new(ErrorCode::TokenExpired, "staff token has expired"))
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejected staff token");
            Err(AppError::new(ErrorCode::TokenInvalid, "staff token is invalid"))
        }
    }
}
