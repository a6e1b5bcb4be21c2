#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use configurator_api::{
    build_router,
    config::AppConfig,
    middleware_helpers::retry::RetryConfig,
    repositories::{InMemoryAuditStore, InMemoryDesignStore},
    security::{SecretKey, SecurityManager},
    services::commerce::{
        CartCommitService, ExternalCheckoutClient, MockCheckoutTransport, PriceReverifier,
    },
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const USER: &str = "u1";
pub const SESSION: &str = "session-1";
pub const DESIGN: &str = "d1";

/// Price of the 120 x 60 x 75 cm wood desk used throughout the tests.
pub const DESK_PRICE: f64 = 116_700.0;

/// Application wired to in-memory stores and the mock checkout transport.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub security: Arc<SecurityManager>,
    pub designs: Arc<InMemoryDesignStore>,
    pub audits: Arc<InMemoryAuditStore>,
    pub transport: Arc<MockCheckoutTransport>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_transport(MockCheckoutTransport::reliable())
    }

    pub fn with_transport(transport: MockCheckoutTransport) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.checkout.mode = "mock".to_string();

        let security = Arc::new(
            SecurityManager::new(&SecretKey::generate()).expect("security manager for tests"),
        );
        let designs = Arc::new(InMemoryDesignStore::new());
        let audits = Arc::new(InMemoryAuditStore::new());
        let transport = Arc::new(transport);
        let client = ExternalCheckoutClient::new(
            transport.clone(),
            RetryConfig::immediate(cfg.checkout.retry_count),
        );

        designs.add_design(DESIGN, USER, "Oak desk");

        let cart_commit = CartCommitService::new(
            security.clone(),
            designs.clone(),
            audits.clone(),
            PriceReverifier::default(),
            client,
        )
        .with_retry_url_base(cfg.retry_url_base.clone());

        let state = AppState {
            config: Arc::new(cfg),
            security: security.clone(),
            cart_commit: Arc::new(cart_commit),
            db: None,
        };

        Self {
            router: build_router(state.clone()),
            state,
            security,
            designs,
            audits,
            transport,
        }
    }

    pub fn commit_service(&self) -> &CartCommitService {
        &self.state.cart_commit
    }

    pub fn csrf_token(&self) -> String {
        self.security.generate_csrf_token(SESSION)
    }

    /// Send a request with the given headers and optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request carrying the default user, session and a fresh CSRF token.
    pub async fn request_as_user(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let token = self.csrf_token();
        self.request(
            method,
            uri,
            body,
            &[
                ("x-user-id", USER),
                ("x-session-id", SESSION),
                ("x-csrf-token", token.as_str()),
            ],
        )
        .await
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not json")
}

/// Wire-shaped item as the configurator UI submits it.
pub fn desk_item_json(price: f64) -> Value {
    json!({
        "designId": DESIGN,
        "quantity": 1,
        "customizations": {
            "width_cm": 120,
            "depth_cm": 60,
            "height_cm": 75,
            "material": "wood",
            "calculated_price": price,
            "price_breakdown": { "base": 8700, "material": 108000 },
            "name": "Desk"
        }
    })
}
