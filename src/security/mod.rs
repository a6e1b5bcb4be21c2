//! Cryptographic context for the cart pipeline.
//!
//! One [`SecurityManager`] is built at startup from the process secret and
//! injected wherever tokens are issued or checked. Each primitive works on its
//! own subkey derived from that secret.

pub mod crypto;
pub mod csrf;
pub mod integrity;
pub mod key;
pub mod tokens;

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;

pub use crypto::{CryptoCodec, EncryptedPayload};
pub use csrf::{CsrfTokenizer, DEFAULT_CSRF_MAX_AGE};
pub use integrity::IntegrityHasher;
pub use key::SecretKey;
pub use tokens::{AuthTokenClaims, AuthTokenRequest, CartIdClaims, OpaqueTokenCodec};

const AEAD_KEY_LABEL: &str = "configurator/aead/v1";
const CSRF_KEY_LABEL: &str = "configurator/csrf/v1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("a secret key must be configured in the {0} environment")]
    MissingKey(String),

    #[error("decryption failed")]
    Decryption,

    #[error("encryption failed")]
    Encryption,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct SecurityManager {
    crypto: CryptoCodec,
    tokens: OpaqueTokenCodec,
    integrity: IntegrityHasher,
    csrf: CsrfTokenizer,
}

impl SecurityManager {
    pub fn new(key: &SecretKey) -> Result<Self, CryptoError> {
        let crypto = CryptoCodec::new(&key.derive(AEAD_KEY_LABEL)?[..])?;
        let csrf = CsrfTokenizer::new(&key.derive(CSRF_KEY_LABEL)?[..])?;
        Ok(Self {
            tokens: OpaqueTokenCodec::new(crypto.clone()),
            crypto,
            integrity: IntegrityHasher::new(),
            csrf,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, CryptoError> {
        let key = SecretKey::load(config.secret_key.as_deref(), &config.environment)?;
        Ok(Self::new(&key)?.with_auth_token_ttl(config.auth_token_ttl_secs))
    }

    pub fn with_auth_token_ttl(mut self, ttl_secs: i64) -> Self {
        self.tokens = self.tokens.with_default_ttl(ttl_secs);
        self
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CryptoError> {
        self.crypto.encrypt(plaintext)
    }

    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, CryptoError> {
        self.crypto.decrypt(payload)
    }

    pub fn generate_cart_id(
        &self,
        user_id: &str,
        design_id: &str,
        timestamp: Option<i64>,
    ) -> Result<String, CryptoError> {
        self.tokens.encode_cart_id(user_id, design_id, timestamp)
    }

    pub fn verify_cart_id(&self, token: &str) -> CartIdClaims {
        self.tokens.decode_cart_id(token)
    }

    pub fn generate_auth_token(&self, request: &AuthTokenRequest) -> Result<String, CryptoError> {
        self.tokens.encode_auth_token(request)
    }

    pub fn verify_auth_token(&self, token: &str) -> AuthTokenClaims {
        self.tokens.decode_auth_token(token)
    }

    pub fn hash_data(&self, value: &Value) -> String {
        self.integrity.digest(value)
    }

    pub fn verify_data_integrity(&self, value: &Value, expected_digest: &str) -> bool {
        self.integrity.verify(value, expected_digest)
    }

    pub fn generate_csrf_token(&self, session_id: &str) -> String {
        self.csrf.issue(session_id)
    }

    pub fn verify_csrf_token(&self, token: &str, session_id: &str, max_age: Duration) -> bool {
        self.csrf.verify(token, session_id, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> SecurityManager {
        SecurityManager::new(&SecretKey::from_bytes(&[8u8; 32]).unwrap()).unwrap()
    }

    #[test]
    fn managers_sharing_a_secret_interoperate() {
        let a = manager();
        let b = manager();
        let token = a.generate_cart_id("u1", "d1", None).unwrap();
        assert!(b.verify_cart_id(&token).is_valid);

        let csrf = a.generate_csrf_token("sess");
        assert!(b.verify_csrf_token(&csrf, "sess", DEFAULT_CSRF_MAX_AGE));
    }

    #[test]
    fn different_secrets_do_not_interoperate() {
        let other =
            SecurityManager::new(&SecretKey::from_bytes(&[9u8; 32]).unwrap()).unwrap();
        let token = other.generate_cart_id("u1", "d1", None).unwrap();
        assert!(!manager().verify_cart_id(&token).is_valid);
    }

    #[test]
    fn auth_token_ttl_override_applies() {
        let manager = manager().with_auth_token_ttl(-1);
        let token = manager
            .generate_auth_token(&AuthTokenRequest {
                user_id: "u1".into(),
                cart_id: "c1".into(),
                expires_in_seconds: None,
            })
            .unwrap();
        assert!(manager.verify_auth_token(&token).is_expired);
    }

    #[test]
    fn data_integrity_round_trip() {
        let manager = manager();
        let value = json!({"b": 1, "a": [2, 1]});
        let digest = manager.hash_data(&value);
        assert!(manager.verify_data_integrity(&json!({"a": [1, 2], "b": 1}), &digest));
    }
}
