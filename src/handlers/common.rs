use crate::{errors::ServiceError, AppState};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Set by the upstream authentication layer.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Non-empty, trimmed header value.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Authenticated caller as asserted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(&parts.headers, USER_ID_HEADER)
            .map(|user_id| CallerIdentity {
                user_id: user_id.to_string(),
            })
            .ok_or_else(|| ServiceError::Unauthorized("missing x-user-id header".into()))
    }
}

/// Rejects state-changing requests without a CSRF token bound to the session.
pub fn require_csrf(state: &AppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let session_id = header_value(headers, SESSION_ID_HEADER)
        .ok_or_else(|| ServiceError::Unauthorized("missing x-session-id header".into()))?;
    let token = header_value(headers, CSRF_TOKEN_HEADER)
        .ok_or_else(|| ServiceError::Unauthorized("missing x-csrf-token header".into()))?;

    if state
        .security
        .verify_csrf_token(token, session_id, state.config.csrf_max_age())
    {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized("invalid CSRF token".into()))
    }
}
