use crate::{
    entities::{design::CartStatus, purchase_audit_log},
    errors::ServiceError,
    repositories::{AuditUpdate, DesignStore, NewAuditRecord, PurchaseAuditStore},
    security::{AuthTokenClaims, AuthTokenRequest, SecurityManager},
    services::commerce::{
        cart_transform::{CartItemData, CartTransformer},
        checkout_client::{CallResult, ExternalCheckoutClient},
        pricing_service::PriceReverifier,
    },
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Default retry endpoint prefix; the audit id is appended.
pub const DEFAULT_RETRY_URL_BASE: &str = "/api/v1/cart/retry";

const MAX_AUDIT_PAGE: u64 = 100;

const FALLBACK_MESSAGE: &str =
    "The checkout service is temporarily unavailable. Your design is saved and the request can be retried.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSuccess {
    pub success: bool,
    pub cart_id: String,
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<Uuid>,
    /// Auth token binding the user to the external cart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFallback {
    pub success: bool,
    pub fallback: bool,
    pub retry_url: String,
    pub audit_id: Uuid,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitFailure {
    pub success: bool,
    pub error: OutcomeError,
    #[serde(skip)]
    pub status: StatusCode,
}

/// Result of a commit or retry, as returned to the configurator UI.
///
/// Only `Failed` is a hard error; a `Fallback` means the external system could
/// not be reached and the audit record can be replayed later.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommitOutcome {
    Success(CommitSuccess),
    Fallback(CommitFallback),
    Failed(CommitFailure),
}

impl CommitOutcome {
    pub fn from_error(err: &ServiceError) -> Self {
        let details = match err {
            ServiceError::PriceMismatch {
                client_price,
                server_price,
                difference,
            } => Some(json!({
                "clientPrice": client_price.to_f64(),
                "serverPrice": server_price.to_f64(),
                "difference": difference.to_f64(),
            })),
            _ => None,
        };

        CommitOutcome::Failed(CommitFailure {
            success: false,
            error: OutcomeError {
                code: err.code().to_string(),
                message: err.response_message(),
                details,
            },
            status: err.status_code(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommitOutcome::Success(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CommitOutcome::Fallback(_))
    }

    /// Error code of a failed outcome.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            CommitOutcome::Failed(failure) => Some(&failure.error.code),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CommitOutcome::Success(_) | CommitOutcome::Fallback(_) => StatusCode::OK,
            CommitOutcome::Failed(failure) => failure.status,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CommitOutcome::Success(_) => "success",
            CommitOutcome::Fallback(_) => "fallback",
            CommitOutcome::Failed(_) => "failed",
        }
    }
}

impl IntoResponse for CommitOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// One async mutex per design id, dropped from the map once nobody holds or
/// waits on it.
#[derive(Debug, Default, Clone)]
struct DesignLocks {
    inner: Arc<LockMap>,
}

impl DesignLocks {
    async fn acquire(&self, design_id: &str) -> DesignLockGuard {
        let lock = self
            .inner
            .entry(design_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        DesignLockGuard {
            map: Arc::clone(&self.inner),
            key: design_id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

struct DesignLockGuard {
    map: Arc<LockMap>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DesignLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Commits priced designs to the external checkout system.
///
/// Every external call leaves an audit record behind. Failed calls can be
/// replayed with [`CartCommitService::retry_verbatim`], which re-sends the
/// stored payload unchanged.
#[derive(Clone)]
pub struct CartCommitService {
    security: Arc<SecurityManager>,
    designs: Arc<dyn DesignStore>,
    audits: Arc<dyn PurchaseAuditStore>,
    pricing: PriceReverifier,
    transformer: CartTransformer,
    client: ExternalCheckoutClient,
    locks: DesignLocks,
    retry_url_base: String,
}

impl CartCommitService {
    pub fn new(
        security: Arc<SecurityManager>,
        designs: Arc<dyn DesignStore>,
        audits: Arc<dyn PurchaseAuditStore>,
        pricing: PriceReverifier,
        client: ExternalCheckoutClient,
    ) -> Self {
        Self {
            transformer: CartTransformer::new(Arc::clone(&security)),
            security,
            designs,
            audits,
            pricing,
            client,
            locks: DesignLocks::default(),
            retry_url_base: DEFAULT_RETRY_URL_BASE.to_string(),
        }
    }

    pub fn with_retry_url_base(mut self, base: impl Into<String>) -> Self {
        self.retry_url_base = base.into();
        self
    }

    pub fn retry_url(&self, audit_id: Uuid) -> String {
        format!("{}/{}", self.retry_url_base.trim_end_matches('/'), audit_id)
    }

    /// Validates, re-prices and sends one design to the external cart.
    #[instrument(skip(self, item), fields(design_id = %item.design_id))]
    pub async fn add_to_cart(&self, item: &CartItemData, user_id: &str) -> CommitOutcome {
        let started = Instant::now();
        let outcome = match self.commit(item, user_id).await {
            Ok(outcome) => outcome,
            Err(err) => reject(&err),
        };
        record_outcome("add", &outcome, started);
        outcome
    }

    /// Re-sends the payload stored on a failed audit record, byte for byte.
    ///
    /// The item is not re-validated or re-priced. A record that already
    /// succeeded returns its stored result without contacting the checkout
    /// system again.
    #[instrument(skip(self))]
    pub async fn retry_verbatim(&self, audit_id: &str, user_id: &str) -> CommitOutcome {
        let started = Instant::now();
        let outcome = match self.replay(audit_id, user_id).await {
            Ok(outcome) => outcome,
            Err(err) => reject(&err),
        };
        record_outcome("retry", &outcome, started);
        outcome
    }

    pub async fn get_audit_record(
        &self,
        audit_id: &str,
        user_id: &str,
    ) -> Result<purchase_audit_log::Model, ServiceError> {
        self.owned_record(audit_id, user_id).await
    }

    pub async fn list_audit_records(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<purchase_audit_log::Model>, ServiceError> {
        self.audits
            .list_for_user(user_id, limit.clamp(1, MAX_AUDIT_PAGE))
            .await
    }

    pub fn verify_handoff(&self, token: &str) -> AuthTokenClaims {
        self.security.verify_auth_token(token)
    }

    pub async fn checkout_healthy(&self) -> bool {
        self.client.health_check().await
    }

    async fn commit(
        &self,
        item: &CartItemData,
        user_id: &str,
    ) -> Result<CommitOutcome, ServiceError> {
        item.validate()?;
        require_user(user_id)?;

        let _guard = self.locks.acquire(&item.design_id).await;

        let design = self
            .designs
            .find_owned_design(&item.design_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::DesignNotFound(item.design_id.clone()))?;

        if design.cart_status.is_committed() {
            return Err(ServiceError::Conflict(format!(
                "design {} is already in a cart",
                design.id
            )));
        }

        let verification = self.pricing.reverify(&item.customizations)?;
        if !verification.is_valid {
            return Err(ServiceError::PriceMismatch {
                client_price: verification.client_price,
                server_price: verification.server_price,
                difference: verification.difference,
            });
        }

        let external = self
            .transformer
            .to_external(user_id, item, verification.server_price)?;
        let call = self.client.add_to_cart(&external).await?;

        let record = NewAuditRecord {
            user_id: user_id.to_string(),
            design_id: design.id.clone(),
            payload_digest: self.security.hash_data(&call.raw_request),
            outbound_request: call.raw_request.clone(),
            outbound_response: response_snapshot(&call),
            status: audit_status(&call),
            error_message: call.error_message(),
            external_cart_id: call.external_cart_id.clone(),
            redirect_url: call.redirect_url.clone(),
            attempt_count: attempts_as_i32(call.attempts),
        };

        let audit_id = match self.audits.insert(record).await {
            Ok(saved) => Some(saved.id),
            Err(e) if call.success => {
                error!(error = %e, "Audit write failed after successful checkout call");
                None
            }
            Err(e) => return Err(e),
        };

        self.settle(user_id, &design.id, &call, audit_id).await
    }

    async fn replay(&self, audit_id: &str, user_id: &str) -> Result<CommitOutcome, ServiceError> {
        require_user(user_id)?;
        let record = self.owned_record(audit_id, user_id).await?;

        let _guard = self.locks.acquire(&record.design_id).await;
        // Re-read under the lock; a concurrent retry may have settled it.
        let record = self.owned_record(audit_id, user_id).await?;

        if record.status == purchase_audit_log::AuditStatus::Success {
            info!(audit_id = %record.id, "Audit record already succeeded");
            let cart_id = record.external_cart_id.clone().ok_or_else(|| {
                ServiceError::InternalError("successful audit record has no cart id".into())
            })?;
            return Ok(CommitOutcome::Success(CommitSuccess {
                success: true,
                handoff_token: self.handoff_token(user_id, &cart_id),
                cart_id,
                redirect_url: record.redirect_url,
                audit_id: Some(record.id),
            }));
        }

        if !self
            .security
            .verify_data_integrity(&record.outbound_request, &record.payload_digest)
        {
            warn!(audit_id = %record.id, "Stored outbound payload failed integrity check");
            return Err(ServiceError::IntegrityError(format!(
                "audit record {} was modified",
                record.id
            )));
        }

        let design = self
            .designs
            .find_owned_design(&record.design_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::DesignNotFound(record.design_id.clone()))?;
        if design.cart_status.is_committed() {
            return Err(ServiceError::Conflict(format!(
                "design {} is already in a cart",
                design.id
            )));
        }

        let call = self.client.replay(&record.outbound_request).await;

        let update = AuditUpdate {
            outbound_response: response_snapshot(&call),
            status: audit_status(&call),
            error_message: call.error_message(),
            external_cart_id: call.external_cart_id.clone(),
            redirect_url: call.redirect_url.clone(),
            additional_attempts: attempts_as_i32(call.attempts),
        };
        match self.audits.update(record.id, update).await {
            Ok(_) => {}
            Err(e) if call.success => {
                error!(error = %e, audit_id = %record.id, "Audit update failed after successful replay");
            }
            Err(e) => return Err(e),
        }

        self.settle(user_id, &design.id, &call, Some(record.id)).await
    }

    /// Applies the outcome of an external call to the design and builds the
    /// response.
    async fn settle(
        &self,
        user_id: &str,
        design_id: &str,
        call: &CallResult,
        audit_id: Option<Uuid>,
    ) -> Result<CommitOutcome, ServiceError> {
        match (call.success, call.external_cart_id.as_deref()) {
            (true, Some(cart_id)) => {
                if let Err(e) = self
                    .designs
                    .set_cart_status(design_id, CartStatus::InCart, Some(cart_id.to_string()))
                    .await
                {
                    error!(error = %e, "Failed to mark design as in cart");
                }
                info!(attempts = call.attempts, "Design committed to external cart");
                Ok(CommitOutcome::Success(CommitSuccess {
                    success: true,
                    cart_id: cart_id.to_string(),
                    redirect_url: call.redirect_url.clone(),
                    audit_id,
                    handoff_token: self.handoff_token(user_id, cart_id),
                }))
            }
            _ => {
                let audit_id = audit_id.ok_or_else(|| {
                    ServiceError::InternalError("failed call has no audit record".into())
                })?;
                let reason = call.error_message().unwrap_or_else(|| "unknown".to_string());
                warn!(
                    attempts = call.attempts,
                    error = %reason,
                    "Checkout call failed, offering retry"
                );
                Ok(CommitOutcome::Fallback(CommitFallback {
                    success: false,
                    fallback: true,
                    retry_url: self.retry_url(audit_id),
                    audit_id,
                    message: FALLBACK_MESSAGE.to_string(),
                    reason: call
                        .error
                        .as_ref()
                        .and_then(|e| e.code())
                        .map(str::to_string),
                }))
            }
        }
    }

    async fn owned_record(
        &self,
        audit_id: &str,
        user_id: &str,
    ) -> Result<purchase_audit_log::Model, ServiceError> {
        let not_found = || ServiceError::RequestNotFound(audit_id.to_string());
        let id = Uuid::parse_str(audit_id).map_err(|_| not_found())?;
        self.audits
            .get_for_user(id, user_id)
            .await?
            .ok_or_else(not_found)
    }

    fn handoff_token(&self, user_id: &str, cart_id: &str) -> Option<String> {
        let request = AuthTokenRequest {
            user_id: user_id.to_string(),
            cart_id: cart_id.to_string(),
            expires_in_seconds: None,
        };
        match self.security.generate_auth_token(&request) {
            Ok(token) => Some(token),
            Err(e) => {
                error!(error = %e, "Failed to issue handoff token");
                None
            }
        }
    }
}

fn require_user(user_id: &str) -> Result<(), ServiceError> {
    if user_id.trim().is_empty() {
        Err(ServiceError::Unauthorized("missing user id".into()))
    } else {
        Ok(())
    }
}

fn reject(err: &ServiceError) -> CommitOutcome {
    match err {
        ServiceError::DatabaseError(_)
        | ServiceError::ConfigError(_)
        | ServiceError::SerializationError(_)
        | ServiceError::CryptoError(_)
        | ServiceError::InternalError(_) => error!(error = %err, "Cart commit failed"),
        _ => info!(code = err.code(), "Cart commit rejected"),
    }
    CommitOutcome::from_error(err)
}

fn audit_status(call: &CallResult) -> purchase_audit_log::AuditStatus {
    if call.success {
        purchase_audit_log::AuditStatus::Success
    } else {
        purchase_audit_log::AuditStatus::Failed
    }
}

/// Raw vendor body, or the transport error when no body arrived.
fn response_snapshot(call: &CallResult) -> Option<Value> {
    call.raw_response
        .clone()
        .or_else(|| call.error_message().map(|message| json!({ "error": message })))
}

fn attempts_as_i32(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

fn record_outcome(operation: &'static str, outcome: &CommitOutcome, started: Instant) {
    counter!(
        "configurator.cart_commit.outcomes",
        1,
        "operation" => operation,
        "outcome" => outcome.label()
    );
    histogram!(
        "configurator.cart_commit.duration_ms",
        started.elapsed().as_secs_f64() * 1000.0,
        "operation" => operation
    );
}
