use crate::handlers::common::{
    header_value, require_csrf, success_response, CallerIdentity, SESSION_ID_HEADER,
};
use crate::{
    errors::ServiceError, services::commerce::cart_transform::CartItemData, AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Creates the router for cart commit endpoints
pub fn cart_commit_routes() -> Router<AppState> {
    Router::new()
        .route("/csrf-token", get(issue_csrf_token))
        .route("/cart/add", post(add_to_cart))
        .route("/cart/retry/:audit_id", post(retry_cart_operation))
        .route("/cart/audit", get(list_audit_records))
        .route("/cart/audit/:audit_id", get(get_audit_record))
        .route("/cart/handoff/verify", post(verify_handoff))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CsrfTokenResponse {
    csrf_token: String,
    expires_in_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct HandoffVerifyRequest {
    pub token: String,
}

/// Issue a CSRF token bound to the caller's session
async fn issue_csrf_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let session_id = header_value(&headers, SESSION_ID_HEADER)
        .ok_or_else(|| ServiceError::Unauthorized("missing x-session-id header".into()))?;

    Ok(success_response(CsrfTokenResponse {
        csrf_token: state.security.generate_csrf_token(session_id),
        expires_in_seconds: state.config.csrf_max_age_secs,
    }))
}

/// Commit a priced design to the external cart
async fn add_to_cart(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    payload: Result<Json<CartItemData>, JsonRejection>,
) -> Result<Response, ServiceError> {
    require_csrf(&state, &headers)?;
    let Json(item) = payload.map_err(|e| ServiceError::ValidationError(e.body_text()))?;

    debug!(design_id = %item.design_id, "Cart commit requested");
    Ok(state
        .cart_commit
        .add_to_cart(&item, &caller.user_id)
        .await
        .into_response())
}

/// Replay the stored payload of a failed commit
async fn retry_cart_operation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    headers: HeaderMap,
    Path(audit_id): Path<String>,
) -> Result<Response, ServiceError> {
    require_csrf(&state, &headers)?;

    Ok(state
        .cart_commit
        .retry_verbatim(&audit_id, &caller.user_id)
        .await
        .into_response())
}

/// Owner view of one audit record
async fn get_audit_record(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(audit_id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = state
        .cart_commit
        .get_audit_record(&audit_id, &caller.user_id)
        .await?;
    Ok(success_response(record))
}

/// Most recent audit records of the caller
async fn list_audit_records(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<AuditListQuery>,
) -> Result<Response, ServiceError> {
    let records = state
        .cart_commit
        .list_audit_records(&caller.user_id, query.limit)
        .await?;
    Ok(success_response(records))
}

/// Decode a handoff token issued after a successful commit
async fn verify_handoff(
    State(state): State<AppState>,
    Json(payload): Json<HandoffVerifyRequest>,
) -> Response {
    success_response(state.cart_commit.verify_handoff(&payload.token))
}
