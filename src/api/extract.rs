//! Request extractors for caller identity and admin access.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::error::AppError;
use super::AppState;
use crate::domain::Identity;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Who is calling: a registered user (`x-user-id`) or an anonymous session
/// (`x-session-id`). The user id wins when both are sent.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = match header(parts, USER_ID_HEADER) {
            Some(raw) => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::BadRequest(format!("{USER_ID_HEADER} is not a valid UUID")))?,
            ),
            None => None,
        };
        let identity = Identity::resolve(user_id, header(parts, SESSION_ID_HEADER))
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(Caller(identity))
    }
}

/// Admin-only routes. Without a configured key every admin request is refused.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_api_key.as_deref() else {
            return Err(AppError::Unauthorized("admin API is disabled".into()));
        };
        match header(parts, ADMIN_TOKEN_HEADER) {
            Some(token) if token == expected => Ok(AdminAccess),
            Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
            None => Err(AppError::Unauthorized(format!("missing {ADMIN_TOKEN_HEADER} header"))),
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
