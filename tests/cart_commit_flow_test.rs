mod common;

use assert_matches::assert_matches;
use common::{desk_item_json, TestApp, DESIGN, DESK_PRICE, USER};
use configurator_api::{
    entities::{design::CartStatus, purchase_audit_log::AuditStatus},
    errors::codes,
    services::commerce::{
        cart_commit_service::CommitOutcome, CartItemData, ExternalApiError,
        MockCheckoutTransport,
    },
};
use serde_json::json;
use std::time::Duration;

fn desk(price: f64) -> CartItemData {
    serde_json::from_value(desk_item_json(price)).expect("valid cart item")
}

#[tokio::test]
async fn valid_item_is_committed_and_marked_in_cart() {
    let app = TestApp::new();

    let outcome = app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;

    let success = assert_matches!(outcome, CommitOutcome::Success(s) => s);
    assert!(success.redirect_url.is_some());

    let audit = app.audits.get(success.audit_id.unwrap()).unwrap();
    assert_eq!(audit.status, AuditStatus::Success);
    assert_eq!(audit.user_id, USER);
    assert_eq!(audit.design_id, DESIGN);

    let design = app.designs.get(DESIGN).unwrap();
    assert_eq!(design.cart_status, CartStatus::InCart);
    assert_eq!(design.external_cart_id.as_deref(), Some(success.cart_id.as_str()));

    let claims = app
        .commit_service()
        .verify_handoff(success.handoff_token.as_deref().unwrap());
    assert!(claims.is_valid);
    assert_eq!(claims.user_id.as_deref(), Some(USER));
    assert_eq!(claims.cart_id.as_deref(), Some(success.cart_id.as_str()));
}

#[tokio::test]
async fn outbound_payload_hides_internal_identifiers() {
    let app = TestApp::new();

    app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;

    let sent = app.transport.requests();
    assert_eq!(sent.len(), 1);
    let text = sent[0].to_string();
    assert!(!text.contains("\"u1\""));
    assert!(!text.contains("\"d1\""));
    let mut keys: Vec<&str> = sent[0]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        [
            "name",
            "product_id",
            "quantity",
            "reference_id",
            "specification",
            "total_price",
            "unit_price"
        ]
    );
    assert_eq!(sent[0]["unit_price"], json!(DESK_PRICE));
    assert_eq!(sent[0]["product_id"], json!("custom-wood"));

    let reference = sent[0]["reference_id"].as_str().unwrap();
    let claims = app.security.verify_cart_id(reference);
    assert!(claims.is_valid);
    assert_eq!(claims.user_id, USER);
    assert_eq!(claims.design_id, DESIGN);
}

#[tokio::test]
async fn tampered_price_is_rejected_without_external_call() {
    let app = TestApp::new();

    let outcome = app.commit_service().add_to_cart(&desk(1_000.0), USER).await;

    let failure = assert_matches!(outcome, CommitOutcome::Failed(f) => f);
    assert!(!failure.success);
    assert_eq!(failure.error.code, codes::PRICE_MISMATCH);
    assert_eq!(app.transport.call_count(), 0);
    assert!(app.audits.is_empty());
    assert_eq!(app.designs.get(DESIGN).unwrap().cart_status, CartStatus::Saved);
}

#[tokio::test]
async fn exhausted_retries_fall_back_with_retry_link() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());

    let outcome = app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;

    let fallback = assert_matches!(outcome, CommitOutcome::Fallback(f) => f);
    assert!(fallback.fallback);
    assert!(!fallback.success);
    assert!(fallback.retry_url.ends_with(&fallback.audit_id.to_string()));

    let retry_count = app.state.config.checkout.retry_count;
    assert_eq!(app.transport.call_count(), retry_count);

    let audit = app.audits.get(fallback.audit_id).unwrap();
    assert_eq!(audit.status, AuditStatus::Failed);
    assert!(audit.error_message.is_some());
    assert_eq!(audit.attempt_count, retry_count as i32);
    assert_eq!(app.designs.get(DESIGN).unwrap().cart_status, CartStatus::Saved);
}

#[tokio::test]
async fn retry_after_outage_commits_the_stored_payload() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());
    let fallback = assert_matches!(
        app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await,
        CommitOutcome::Fallback(f) => f
    );

    app.transport.set_failure_rate(0.0);
    let outcome = app
        .commit_service()
        .retry_verbatim(&fallback.audit_id.to_string(), USER)
        .await;

    let success = assert_matches!(outcome, CommitOutcome::Success(s) => s);
    assert_eq!(success.audit_id, Some(fallback.audit_id));

    let audit = app.audits.get(fallback.audit_id).unwrap();
    assert_eq!(audit.status, AuditStatus::Success);
    assert_eq!(audit.external_cart_id.as_deref(), Some(success.cart_id.as_str()));
    assert!(audit.error_message.is_none());
    assert_eq!(app.designs.get(DESIGN).unwrap().cart_status, CartStatus::InCart);

    let sent = app.transport.requests();
    assert_eq!(sent.first(), sent.last());
    assert_eq!(sent.last(), Some(&audit.outbound_request));
}

#[tokio::test]
async fn retry_ignores_price_changes_after_the_original_attempt() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());
    let fallback = assert_matches!(
        app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await,
        CommitOutcome::Fallback(f) => f
    );
    let original = app.audits.get(fallback.audit_id).unwrap().outbound_request;

    app.transport.set_failure_rate(0.0);
    app.commit_service()
        .retry_verbatim(&fallback.audit_id.to_string(), USER)
        .await;

    assert_eq!(app.transport.requests().last(), Some(&original));
}

#[tokio::test]
async fn retry_by_another_user_is_not_found() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());
    let fallback = assert_matches!(
        app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await,
        CommitOutcome::Fallback(f) => f
    );
    let calls_before = app.transport.call_count();

    let outcome = app
        .commit_service()
        .retry_verbatim(&fallback.audit_id.to_string(), "intruder")
        .await;

    assert_eq!(outcome.error_code(), Some(codes::REQUEST_NOT_FOUND));
    assert_eq!(app.transport.call_count(), calls_before);
}

#[tokio::test]
async fn non_retryable_rejection_stops_after_one_attempt() {
    let transport = MockCheckoutTransport::reliable();
    transport.enqueue(Err(ExternalApiError::Rejected {
        code: "INVALID_PRODUCT".into(),
        message: "unknown product".into(),
    }));
    let app = TestApp::with_transport(transport);

    let outcome = app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;

    let fallback = assert_matches!(outcome, CommitOutcome::Fallback(f) => f);
    assert_eq!(fallback.reason.as_deref(), Some("INVALID_PRODUCT"));
    assert_eq!(app.transport.call_count(), 1);
    assert_eq!(app.audits.get(fallback.audit_id).unwrap().attempt_count, 1);
}

#[tokio::test]
async fn transient_failure_is_retried_within_one_commit() {
    let transport = MockCheckoutTransport::reliable();
    transport.enqueue(Err(ExternalApiError::Timeout));
    let app = TestApp::with_transport(transport);

    let outcome = app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;

    let success = assert_matches!(outcome, CommitOutcome::Success(s) => s);
    assert_eq!(app.transport.call_count(), 2);
    assert_eq!(app.audits.get(success.audit_id.unwrap()).unwrap().attempt_count, 2);
}

#[tokio::test]
async fn second_commit_of_same_design_is_already_in_cart() {
    let app = TestApp::with_transport(MockCheckoutTransport::new(
        Duration::from_millis(10),
        0.0,
        Some(7),
    ));
    let item = desk(DESK_PRICE);

    let (first, second) = tokio::join!(
        app.commit_service().add_to_cart(&item, USER),
        app.commit_service().add_to_cart(&item, USER)
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| o.error_code() == Some(codes::ALREADY_IN_CART)));
    assert_eq!(app.transport.call_count(), 1);
    assert_eq!(app.audits.len(), 1);
}

#[tokio::test]
async fn audit_records_are_listed_newest_first() {
    let app = TestApp::with_transport(MockCheckoutTransport::failing());
    app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.commit_service().add_to_cart(&desk(DESK_PRICE), USER).await;

    let records = app.commit_service().list_audit_records(USER, 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].created_at >= records[1].created_at);

    let none = app.commit_service().list_audit_records("u2", 10).await.unwrap();
    assert!(none.is_empty());
}
