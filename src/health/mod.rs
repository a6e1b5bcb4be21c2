/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - process status and database reachability
 * - Checkout probe (`/health/checkout`) - reachability of the external checkout system
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Up,
    Down,
    NotConfigured,
}

/// Creates router with health check endpoints
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/checkout", get(checkout_health))
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => match crate::db::check_connection(db).await {
            Ok(()) => HealthStatus::Up,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                HealthStatus::Down
            }
        },
        None => HealthStatus::NotConfigured,
    };

    let (status_code, status) = if database == HealthStatus::Down {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Down)
    } else {
        (StatusCode::OK, HealthStatus::Up)
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": { "database": database },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// External checkout probe; never fails the request itself
pub async fn checkout_health(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.cart_commit.checkout_healthy().await;
    let (status_code, status) = if healthy {
        (StatusCode::OK, HealthStatus::Up)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Down)
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "mode": state.config.checkout.mode,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
