mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, desk_item_json, TestApp, DESK_PRICE, SESSION, USER};
use configurator_api::services::commerce::MockCheckoutTransport;
use serde_json::{json, Value};

#[tokio::test]
async fn csrf_token_requires_session() {
    let app = TestApp::new();

    let missing = app
        .request(Method::GET, "/api/v1/csrf-token", None, &[])
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::GET,
            "/api/v1/csrf-token",
            None,
            &[("x-session-id", SESSION)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let token = body["csrfToken"].as_str().unwrap();
    assert!(app
        .security
        .verify_csrf_token(token, SESSION, app.state.config.csrf_max_age()));
}

#[tokio::test]
async fn add_to_cart_succeeds_with_valid_headers() {
    let app = TestApp::new();

    let response = app
        .request_as_user(Method::POST, "/api/v1/cart/add", Some(desk_item_json(DESK_PRICE)))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["cartId"].as_str().unwrap().starts_with("mock-cart-"));
    assert!(body["redirectUrl"].is_string());
    assert!(body["handoffToken"].is_string());
}

#[tokio::test]
async fn add_to_cart_without_csrf_is_rejected() {
    let app = TestApp::new();

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/add",
            Some(desk_item_json(DESK_PRICE)),
            &[("x-user-id", USER), ("x-session-id", SESSION)],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.transport.call_count(), 0);
}

#[tokio::test]
async fn csrf_token_from_another_session_is_rejected() {
    let app = TestApp::new();
    let foreign = app.security.generate_csrf_token("other-session");

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/add",
            Some(desk_item_json(DESK_PRICE)),
            &[
                ("x-user-id", USER),
                ("x-session-id", SESSION),
                ("x-csrf-token", foreign.as_str()),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_user_is_unauthorized() {
    let app = TestApp::new();
    let token = app.csrf_token();

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/add",
            Some(desk_item_json(DESK_PRICE)),
            &[("x-session-id", SESSION), ("x-csrf-token", token.as_str())],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], json!("INVALID_TOKEN"));
}

#[tokio::test]
async fn price_mismatch_maps_to_unprocessable_entity() {
    let app = TestApp::new();

    let response = app
        .request_as_user(Method::POST, "/api/v1/cart/add", Some(desk_item_json(1_000.0)))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("PRICE_MISMATCH"));
    assert_eq!(body["error"]["details"]["serverPrice"], json!(DESK_PRICE));
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let app = TestApp::new();

    let response = app
        .request_as_user(
            Method::POST,
            "/api/v1/cart/add",
            Some(json!({ "designId": "d1" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], json!("VALIDATION_ERROR"));

    let mut out_of_range = desk_item_json(DESK_PRICE);
    out_of_range["customizations"]["material"] = json!("unobtainium");
    let response = app
        .request_as_user(Method::POST, "/api/v1/cart/add", Some(out_of_range))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"]["code"],
        json!("VALIDATION_ERROR")
    );
}

#[tokio::test]
async fn unknown_design_is_not_found() {
    let app = TestApp::new();
    let mut item = desk_item_json(DESK_PRICE);
    item["designId"] = json!("d404");

    let response = app
        .request_as_user(Method::POST, "/api/v1/cart/add", Some(item))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["error"]["code"],
        json!("DESIGN_NOT_FOUND")
    );
}

#[tokio::test]
async fn outage_returns_fallback_then_retry_succeeds() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());

    let response = app
        .request_as_user(Method::POST, "/api/v1/cart/add", Some(desk_item_json(DESK_PRICE)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["fallback"], json!(true));
    let retry_url = body["retryUrl"].as_str().unwrap().to_string();
    let audit_id = body["auditId"].as_str().unwrap().to_string();
    assert_eq!(retry_url, format!("/api/v1/cart/retry/{audit_id}"));

    let audit = app
        .request(
            Method::GET,
            &format!("/api/v1/cart/audit/{audit_id}"),
            None,
            &[("x-user-id", USER)],
        )
        .await;
    assert_eq!(audit.status(), StatusCode::OK);
    assert_eq!(body_json(audit).await["status"], json!("failed"));

    app.transport.set_failure_rate(0.0);
    let retried = app.request_as_user(Method::POST, &retry_url, None).await;
    assert_eq!(retried.status(), StatusCode::OK);
    let body = body_json(retried).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["auditId"], json!(audit_id));
}

#[tokio::test]
async fn audit_record_is_owner_scoped() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());
    let body = body_json(
        app.request_as_user(Method::POST, "/api/v1/cart/add", Some(desk_item_json(DESK_PRICE)))
            .await,
    )
    .await;
    let audit_id = body["auditId"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/cart/audit/{audit_id}"),
            None,
            &[("x-user-id", "u2")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let list = app
        .request(
            Method::GET,
            "/api/v1/cart/audit?limit=5",
            None,
            &[("x-user-id", USER)],
        )
        .await;
    assert_eq!(list.status(), StatusCode::OK);
    let records: Value = body_json(list).await;
    assert_eq!(records.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn handoff_token_round_trips_through_verify_endpoint() {
    let app = TestApp::new();
    let body = body_json(
        app.request_as_user(Method::POST, "/api/v1/cart/add", Some(desk_item_json(DESK_PRICE)))
            .await,
    )
    .await;
    let token = body["handoffToken"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/handoff/verify",
            Some(json!({ "token": token })),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let claims = body_json(response).await;
    assert_eq!(claims["isValid"], json!(true));
    assert_eq!(claims["userId"], json!(USER));
    assert_eq!(claims["cartId"], body["cartId"]);

    let forged = app
        .request(
            Method::POST,
            "/api/v1/cart/handoff/verify",
            Some(json!({ "token": "at_not-a-token" })),
            &[],
        )
        .await;
    assert_eq!(body_json(forged).await["isValid"], json!(false));
}

#[tokio::test]
async fn health_endpoints_report_status() {
    let app = TestApp::new();

    let health = app.request(Method::GET, "/health", None, &[]).await;
    assert_eq!(health.status(), StatusCode::OK);
    let body = body_json(health).await;
    assert_eq!(body["status"], json!("up"));
    assert_eq!(body["checks"]["database"], json!("not_configured"));

    let checkout = app.request(Method::GET, "/health/checkout", None, &[]).await;
    assert_eq!(checkout.status(), StatusCode::OK);

    app.transport.set_healthy(false);
    let checkout = app.request(Method::GET, "/health/checkout", None, &[]).await;
    assert_eq!(checkout.status(), StatusCode::SERVICE_UNAVAILABLE);
}
