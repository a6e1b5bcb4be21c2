use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::security::CryptoError;
use crate::services::commerce::checkout_client::ExternalApiError;

fn current_request_id() -> Option<String> {
    crate::request_context::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Machine-readable outcome codes surfaced to the configurator UI.
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const DESIGN_NOT_FOUND: &str = "DESIGN_NOT_FOUND";
    pub const PRICE_MISMATCH: &str = "PRICE_MISMATCH";
    pub const REQUEST_NOT_FOUND: &str = "REQUEST_NOT_FOUND";
    pub const ALREADY_IN_CART: &str = "ALREADY_IN_CART";
    pub const INTEGRITY_CHECK_FAILED: &str = "INTEGRITY_CHECK_FAILED";
    pub const EXTERNAL_API_ERROR: &str = "EXTERNAL_API_ERROR";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Standard error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Machine-readable code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Design not found: {0}")]
    DesignNotFound(String),

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Price mismatch: client {client_price}, server {server_price}")]
    PriceMismatch {
        client_price: Decimal,
        server_price: Decimal,
        difference: Decimal,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Integrity check failed: {0}")]
    IntegrityError(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("External API error: {0}")]
    ExternalApiError(#[from] ExternalApiError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::DesignNotFound(_) | Self::RequestNotFound(_) => StatusCode::NOT_FOUND,
            Self::PriceMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) | Self::IntegrityError(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) | Self::CryptoError(_) => StatusCode::UNAUTHORIZED,
            Self::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the outcome envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => codes::VALIDATION_ERROR,
            Self::DesignNotFound(_) => codes::DESIGN_NOT_FOUND,
            Self::RequestNotFound(_) => codes::REQUEST_NOT_FOUND,
            Self::PriceMismatch { .. } => codes::PRICE_MISMATCH,
            Self::Conflict(_) => codes::ALREADY_IN_CART,
            Self::IntegrityError(_) => codes::INTEGRITY_CHECK_FAILED,
            Self::Unauthorized(_) | Self::CryptoError(_) => codes::INVALID_TOKEN,
            Self::ExternalApiError(_) => codes::EXTERNAL_API_ERROR,
            Self::DatabaseError(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_)
            | Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => "Internal server error".to_string(),
            Self::CryptoError(_) => "Invalid or expired token".to_string(),
            Self::ExternalApiError(_) => "External checkout service unavailable".to_string(),
            Self::PriceMismatch { .. } => {
                "The submitted price does not match the current price for this configuration"
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
