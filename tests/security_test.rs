//! Property-based tests for the sealing, token, digest and CSRF primitives.

use std::time::Duration;

use configurator_api::security::{
    AuthTokenRequest, CryptoCodec, IntegrityHasher, SecretKey, SecurityManager,
    DEFAULT_CSRF_MAX_AGE,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn manager() -> SecurityManager {
    SecurityManager::new(&SecretKey::generate()).expect("security manager")
}

fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,40}"
}

fn flat_object_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
        .prop_map(|map| map.into_iter().collect())
}

fn object_from(entries: &[(String, i64)]) -> Value {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key.clone(), json!(value));
    }
    Value::Object(map)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sealed_payload_opens_to_original(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let codec = CryptoCodec::new(&[7u8; 32]).unwrap();
        let sealed = codec.encrypt(&plaintext).unwrap();
        prop_assert_eq!(codec.decrypt(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn flipped_ciphertext_byte_is_detected(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
    ) {
        let codec = CryptoCodec::new(&[9u8; 32]).unwrap();
        let mut sealed = codec.encrypt(&plaintext).unwrap();

        let mut bytes = hex::decode(&sealed.ciphertext).unwrap();
        let i = index.index(bytes.len());
        bytes[i] ^= 0x01;
        sealed.ciphertext = hex::encode(bytes);

        prop_assert!(codec.decrypt(&sealed).is_err());
    }

    #[test]
    fn flipped_tag_byte_is_detected(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        index in 0usize..16,
    ) {
        let codec = CryptoCodec::new(&[3u8; 32]).unwrap();
        let mut sealed = codec.encrypt(&plaintext).unwrap();

        let mut tag = hex::decode(&sealed.auth_tag).unwrap();
        tag[index] ^= 0x80;
        sealed.auth_tag = hex::encode(tag);

        prop_assert!(codec.decrypt(&sealed).is_err());
    }

    #[test]
    fn cart_id_round_trips(
        user_id in identifier_strategy(),
        design_id in identifier_strategy(),
        timestamp in 0i64..4_102_444_800_000,
    ) {
        let security = manager();
        let token = security.generate_cart_id(&user_id, &design_id, Some(timestamp)).unwrap();
        let claims = security.verify_cart_id(&token);

        prop_assert!(claims.is_valid);
        prop_assert_eq!(claims.user_id, user_id);
        prop_assert_eq!(claims.design_id, design_id);
        prop_assert_eq!(claims.timestamp, timestamp);
    }

    #[test]
    fn truncated_cart_id_is_invalid(cut in 1usize..12) {
        let security = manager();
        let token = security.generate_cart_id("u1", "d1", None).unwrap();
        let truncated = &token[..token.len() - cut];

        prop_assert!(!security.verify_cart_id(truncated).is_valid);
    }

    #[test]
    fn digest_ignores_key_order(entries in flat_object_strategy()) {
        let hasher = IntegrityHasher::new();
        let forward = object_from(&entries);
        let mut reversed_entries = entries.clone();
        reversed_entries.reverse();
        let reversed = object_from(&reversed_entries);

        prop_assert_eq!(hasher.digest(&forward), hasher.digest(&reversed));
    }

    #[test]
    fn digest_changes_with_any_scalar(entries in flat_object_strategy(), pick in any::<prop::sample::Index>()) {
        let hasher = IntegrityHasher::new();
        let original = object_from(&entries);

        let mut changed_entries = entries.clone();
        let i = pick.index(changed_entries.len());
        changed_entries[i].1 = changed_entries[i].1.wrapping_add(1);
        let changed = object_from(&changed_entries);

        prop_assert_ne!(hasher.digest(&original), hasher.digest(&changed));
    }

    #[test]
    fn csrf_token_is_bound_to_its_session(
        session_a in identifier_strategy(),
        session_b in identifier_strategy(),
    ) {
        prop_assume!(session_a != session_b);
        let security = manager();
        let token = security.generate_csrf_token(&session_a);

        prop_assert!(security.verify_csrf_token(&token, &session_a, DEFAULT_CSRF_MAX_AGE));
        prop_assert!(!security.verify_csrf_token(&token, &session_b, DEFAULT_CSRF_MAX_AGE));
    }
}

#[test]
fn tampered_price_changes_digest() {
    let hasher = IntegrityHasher::new();
    let a = json!({ "product_id": "custom-wood", "unit_price": 116700, "quantity": 1 });
    let b = json!({ "quantity": 1, "unit_price": 116700, "product_id": "custom-wood" });
    let tampered = json!({ "product_id": "custom-wood", "unit_price": 1000, "quantity": 1 });

    assert_eq!(hasher.digest(&a), hasher.digest(&b));
    assert_ne!(hasher.digest(&a), hasher.digest(&tampered));
}

#[test]
fn expired_auth_token_is_invalid() {
    let security = manager();
    let token = security
        .generate_auth_token(&AuthTokenRequest {
            user_id: "u1".into(),
            cart_id: "ext-1".into(),
            expires_in_seconds: Some(-1),
        })
        .unwrap();

    let claims = security.verify_auth_token(&token);
    assert!(claims.is_expired);
    assert!(!claims.is_valid);
}

#[test]
fn zero_max_age_rejects_fresh_csrf_token() {
    let security = manager();
    let token = security.generate_csrf_token("session-a");

    assert!(!security.verify_csrf_token(&token, "session-a", Duration::ZERO));
}

#[test]
fn tokens_from_another_key_are_invalid() {
    let issuer = manager();
    let verifier = manager();

    let cart_id = issuer.generate_cart_id("u1", "d1", None).unwrap();
    assert!(!verifier.verify_cart_id(&cart_id).is_valid);

    let csrf = issuer.generate_csrf_token("s");
    assert!(!verifier.verify_csrf_token(&csrf, "s", DEFAULT_CSRF_MAX_AGE));
}

#[test]
fn cart_id_is_not_accepted_as_auth_token() {
    let security = manager();
    let cart_id = security.generate_cart_id("u1", "d1", None).unwrap();

    assert!(!security.verify_auth_token(&cart_id).is_valid);
}
