//! Request guards.
//!
//! Mutating handlers check in a fixed order: validate the body, then
//! authenticate, then check the anti-forgery token. The body extractor has
//! to be the last argument, so those handlers take the session and CSRF
//! guards as `Result<_, AppError>` and resolve them with `?` once
//! [`ValidJson`] has accepted the body:
//!
//! ```ignore
//! pub async fn handler(
//!     State(state): State<AppState>,
//!     user: std::result::Result<CurrentUser, AppError>,
//!     csrf: std::result::Result<CsrfVerified, AppError>,
//!     ValidJson(body): ValidJson<Body>,
//! ) -> Result<Json<Reply>> {
//!     let CurrentUser(user) = user?;
//!     csrf?;
//!     // ...
//! }
//! ```
//!
//! Handlers without a body take the guards directly. Nothing reaches an
//! executor before every guard has passed. Every rejection is an
//! [`AppError`], so clients always get the JSON error envelope.

use crate::auth::csrf_tokens_match;
use crate::db::User;
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use serde::de::DeserializeOwned;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "access_token";
/// Cookie carrying the double-submit CSRF token.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header that must echo the CSRF cookie on mutations.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Value of a cookie from the `Cookie` request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| cookie_value(headers, SESSION_COOKIE))
}

/// The authenticated user, if any. Missing or stale sessions resolve to
/// `None` rather than an error.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };
        Ok(MaybeUser(state.auth.validate_token(&token)?))
    }
}

/// The authenticated user; rejects with 401 otherwise.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing session token".to_string()))?;

        state
            .auth
            .validate_token(&token)?
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))
    }
}

/// Proof that the request carried a matching CSRF cookie and header;
/// rejects with 403 otherwise.
pub struct CsrfVerified;

impl<S: Send + Sync> FromRequestParts<S> for CsrfVerified {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let cookie = cookie_value(&parts.headers, CSRF_COOKIE)
            .ok_or_else(|| AppError::Forbidden("Missing CSRF cookie".to_string()))?;
        let provided = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Forbidden("Missing CSRF token header".to_string()))?;

        if csrf_tokens_match(&cookie, provided.trim()) {
            Ok(CsrfVerified)
        } else {
            Err(AppError::Forbidden("CSRF token mismatch".to_string()))
        }
    }
}

/// Request bodies that check their own contents after deserializing.
pub trait Validate {
    /// Reject semantically invalid values.
    fn validate(&self) -> Result<()>;
}

/// JSON body that deserialized and passed [`Validate`]; rejects with 400.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Query string deserialized into `T`; rejects with 400.
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let Query(value) = Query::<T>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::Validation(format!("invalid query: {}", e.body_text())))?;
        Ok(ValidQuery(value))
    }
}

/// Path parameters deserialized into `T`; rejects with 400.
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(format!("invalid path: {}", e.body_text())))?;
        Ok(ValidPath(value))
    }
}

/// Trimmed, non-empty, bounded text field.
pub fn require_text(field: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > 255 {
        return Err(AppError::Validation(format!(
            "{} must be at most 255 characters",
            field
        )));
    }
    Ok(())
}
