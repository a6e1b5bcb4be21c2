//! Client for the independently operated checkout system.
//!
//! The transport performs exactly one HTTP exchange; [`ExternalCheckoutClient`]
//! layers the retry policy and outcome classification on top of it.

use crate::{
    config::CheckoutApiConfig,
    errors::ServiceError,
    middleware_helpers::retry::{with_retry, RetryConfig},
    services::commerce::cart_transform::{CartTransformer, ExternalCartItem},
};
use async_trait::async_trait;
use metrics::{counter, histogram};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Vendor error codes that make further attempts pointless.
pub const NON_RETRYABLE_CODES: &[&str] = &[
    "INVALID_PRODUCT",
    "INVALID_PRICE",
    "UNAUTHORIZED",
    "FORBIDDEN",
    "VALIDATION_ERROR",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ExternalApiError {
    /// Vendor supplied (or status derived) error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Http { code, .. } => code.as_deref(),
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self.code() {
            Some(code) => !NON_RETRYABLE_CODES.contains(&code),
            None => true,
        }
    }
}

/// Body returned by `POST /cart/add`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutApiResponse {
    #[serde(default)]
    pub success: bool,
    pub cart_id: Option<String>,
    pub redirect_url: Option<String>,
    pub message: Option<String>,
    pub error_code: Option<String>,
}

/// Raw status and body of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportReply {
    pub status: u16,
    pub body: Value,
}

impl TransportReply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Outcome of an add-to-cart call after retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub success: bool,
    pub external_cart_id: Option<String>,
    pub redirect_url: Option<String>,
    /// Exact payload sent on the wire
    pub raw_request: Value,
    /// Body of the last response, if one arrived
    pub raw_response: Option<Value>,
    #[serde(skip)]
    pub error: Option<ExternalApiError>,
    pub attempts: u32,
}

impl CallResult {
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// One HTTP exchange with the checkout system. No retries.
#[async_trait]
pub trait CheckoutTransport: Send + Sync {
    async fn send_add_to_cart(&self, payload: &Value) -> Result<TransportReply, ExternalApiError>;

    async fn probe_health(&self) -> Result<(), ExternalApiError>;
}

/// reqwest transport: bearer auth, JSON body, per-request timeout.
pub struct HttpCheckoutTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    health_timeout: Duration,
}

impl HttpCheckoutTransport {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        health_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() || api_key.trim().is_empty() {
            return Err(ServiceError::ConfigError(
                "checkout base_url and api_key are required in live mode".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("configurator-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::ConfigError(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            timeout,
            health_timeout,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ExternalApiError {
    if err.is_timeout() {
        ExternalApiError::Timeout
    } else {
        ExternalApiError::Network(err.to_string())
    }
}

#[async_trait]
impl CheckoutTransport for HttpCheckoutTransport {
    async fn send_add_to_cart(&self, payload: &Value) -> Result<TransportReply, ExternalApiError> {
        let response = self
            .client
            .post(format!("{}/cart/add", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        Ok(TransportReply { status, body })
    }

    async fn probe_health(&self) -> Result<(), ExternalApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExternalApiError::Http {
                status: response.status().as_u16(),
                code: None,
                message: "health probe failed".into(),
            })
        }
    }
}

struct MockState {
    rng: StdRng,
    failure_rate: f64,
    scripted: VecDeque<Result<TransportReply, ExternalApiError>>,
    requests: Vec<Value>,
}

/// In-process stand-in for the checkout system.
///
/// Simulates latency and fails a configurable fraction of calls with a 503.
/// With a fixed seed the failure sequence is reproducible. Replies queued with
/// [`MockCheckoutTransport::enqueue`] are served before random behaviour.
pub struct MockCheckoutTransport {
    latency: Duration,
    state: Mutex<MockState>,
    calls: AtomicU32,
    healthy: AtomicBool,
}

impl MockCheckoutTransport {
    pub fn new(latency: Duration, failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            latency,
            state: Mutex::new(MockState {
                rng,
                failure_rate: failure_rate.clamp(0.0, 1.0),
                scripted: VecDeque::new(),
                requests: Vec::new(),
            }),
            calls: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Always succeeds, no latency.
    pub fn reliable() -> Self {
        Self::new(Duration::ZERO, 0.0, Some(0))
    }

    /// Always fails with a retryable error.
    pub fn failing() -> Self {
        Self::new(Duration::ZERO, 1.0, Some(0))
    }

    fn lock_state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(), // Recover from poisoned mutex
        }
    }

    pub fn set_failure_rate(&self, rate: f64) {
        self.lock_state().failure_rate = rate.clamp(0.0, 1.0);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn enqueue(&self, reply: Result<TransportReply, ExternalApiError>) {
        self.lock_state().scripted.push_back(reply);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Payloads received so far, in order.
    pub fn requests(&self) -> Vec<Value> {
        self.lock_state().requests.clone()
    }
}

#[async_trait]
impl CheckoutTransport for MockCheckoutTransport {
    async fn send_add_to_cart(&self, payload: &Value) -> Result<TransportReply, ExternalApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock_state();
        state.requests.push(payload.clone());

        if let Some(reply) = state.scripted.pop_front() {
            return reply;
        }

        let roll: f64 = state.rng.gen();
        if roll < state.failure_rate {
            return Ok(TransportReply::new(
                503,
                json!({
                    "success": false,
                    "message": "Simulated checkout outage",
                    "error_code": "SERVICE_UNAVAILABLE"
                }),
            ));
        }

        let cart_id = format!("mock-cart-{}", Uuid::new_v4().simple());
        Ok(TransportReply::new(
            200,
            json!({
                "success": true,
                "cart_id": cart_id,
                "redirect_url": format!("https://checkout.mock.local/cart/{cart_id}"),
            }),
        ))
    }

    async fn probe_health(&self) -> Result<(), ExternalApiError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExternalApiError::Network("mock checkout marked unhealthy".into()))
        }
    }
}

/// Failed attempt plus whatever body came back with it.
struct AttemptFailure {
    error: ExternalApiError,
    raw_response: Option<Value>,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

struct AttemptSuccess {
    response: CheckoutApiResponse,
    raw_response: Value,
}

fn classify(reply: TransportReply) -> Result<AttemptSuccess, AttemptFailure> {
    let parsed = serde_json::from_value::<CheckoutApiResponse>(reply.body.clone());

    if !(200..300).contains(&reply.status) {
        let (code, message) = match parsed {
            Ok(body) => (body.error_code, body.message),
            Err(_) => (None, None),
        };
        let code = code.or_else(|| match reply.status {
            401 => Some("UNAUTHORIZED".to_string()),
            403 => Some("FORBIDDEN".to_string()),
            _ => None,
        });
        return Err(AttemptFailure {
            error: ExternalApiError::Http {
                status: reply.status,
                code,
                message: message.unwrap_or_else(|| format!("status {}", reply.status)),
            },
            raw_response: Some(reply.body),
        });
    }

    let response = match parsed {
        Ok(response) => response,
        Err(e) => {
            return Err(AttemptFailure {
                error: ExternalApiError::InvalidResponse(e.to_string()),
                raw_response: Some(reply.body),
            })
        }
    };

    if !response.success {
        return Err(AttemptFailure {
            error: ExternalApiError::Rejected {
                code: response
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                message: response
                    .message
                    .clone()
                    .unwrap_or_else(|| "checkout rejected the item".to_string()),
            },
            raw_response: Some(reply.body),
        });
    }

    if response.cart_id.as_deref().map_or(true, str::is_empty) {
        return Err(AttemptFailure {
            error: ExternalApiError::InvalidResponse("success without cart_id".into()),
            raw_response: Some(reply.body),
        });
    }

    Ok(AttemptSuccess {
        response,
        raw_response: reply.body,
    })
}

/// Upper bound on one attempt when none is configured.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resilient add-to-cart client.
///
/// Every attempt is bounded by `attempt_timeout` whatever the transport does;
/// an elapsed attempt counts as [`ExternalApiError::Timeout`] and is retried.
#[derive(Clone)]
pub struct ExternalCheckoutClient {
    transport: Arc<dyn CheckoutTransport>,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl ExternalCheckoutClient {
    pub fn new(transport: Arc<dyn CheckoutTransport>, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Builds the live HTTP client or the simulator depending on `mode`.
    pub fn from_config(config: &CheckoutApiConfig) -> Result<Self, ServiceError> {
        let transport: Arc<dyn CheckoutTransport> = if config.is_mock() {
            info!(
                failure_rate = config.mock_failure_rate,
                "Using mock checkout transport"
            );
            Arc::new(MockCheckoutTransport::new(
                Duration::from_millis(config.mock_latency_ms),
                config.mock_failure_rate,
                config.mock_seed,
            ))
        } else {
            let base_url = config.base_url.as_deref().unwrap_or_default();
            let api_key = config.api_key.as_deref().unwrap_or_default();
            Arc::new(HttpCheckoutTransport::new(
                base_url,
                api_key,
                config.timeout(),
                config.health_timeout(),
            )?)
        };
        Ok(Self::new(transport, config.retry_config()).with_attempt_timeout(config.timeout()))
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Sends a freshly built item. The payload is redacted before sending.
    #[instrument(skip_all, fields(product_id = %item.product_id))]
    pub async fn add_to_cart(&self, item: &ExternalCartItem) -> Result<CallResult, ServiceError> {
        let payload = CartTransformer::outbound_payload(item)?;
        Ok(self.dispatch(payload).await)
    }

    /// Re-sends a stored payload exactly as it was recorded.
    #[instrument(skip_all)]
    pub async fn replay(&self, payload: &Value) -> CallResult {
        self.dispatch(payload.clone()).await
    }

    /// Short probe; never errors.
    pub async fn health_check(&self) -> bool {
        match self.transport.probe_health().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Checkout health probe failed");
                false
            }
        }
    }

    async fn dispatch(&self, payload: Value) -> CallResult {
        let transport = &self.transport;
        let attempt_timeout = self.attempt_timeout;
        let body = &payload;
        let last_response: Mutex<Option<Value>> = Mutex::new(None);
        let last = &last_response;

        let outcome = with_retry(
            &self.retry,
            |failure: &AttemptFailure| failure.error.is_retryable(),
            |attempt| async move {
                counter!("configurator.checkout.attempts", 1);
                let started = Instant::now();
                let result =
                    match tokio::time::timeout(attempt_timeout, transport.send_add_to_cart(body))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(attempt, "Checkout attempt timed out");
                            Err(ExternalApiError::Timeout)
                        }
                    };
                histogram!(
                    "configurator.checkout.latency_ms",
                    started.elapsed().as_secs_f64() * 1000.0
                );
                debug!(attempt, "Checkout attempt finished");

                let classified = match result {
                    Ok(reply) => classify(reply),
                    Err(error) => Err(AttemptFailure {
                        error,
                        raw_response: None,
                    }),
                };
                let raw = match &classified {
                    Ok(success) => Some(success.raw_response.clone()),
                    Err(failure) => failure.raw_response.clone(),
                };
                if let Ok(mut slot) = last.lock() {
                    *slot = raw;
                }
                classified
            },
        )
        .await;

        let attempts = outcome.attempts;
        match outcome.result {
            Ok(success) => {
                counter!("configurator.checkout.success", 1);
                CallResult {
                    success: true,
                    external_cart_id: success.response.cart_id,
                    redirect_url: success.response.redirect_url,
                    raw_request: payload,
                    raw_response: Some(success.raw_response),
                    error: None,
                    attempts,
                }
            }
            Err(failure) => {
                counter!("configurator.checkout.failure", 1);
                let raw_response = match last_response.into_inner() {
                    Ok(raw) => raw,
                    Err(poisoned) => poisoned.into_inner(),
                }
                .or(failure.raw_response);
                CallResult {
                    success: false,
                    external_cart_id: None,
                    redirect_url: None,
                    raw_request: payload,
                    raw_response,
                    error: Some(failure.error),
                    attempts,
                }
            }
        }
    }
}
