use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::crypto::{CryptoCodec, EncryptedPayload};
use super::CryptoError;

pub const CART_ID_PREFIX: &str = "cart_";
pub const AUTH_TOKEN_PREFIX: &str = "at_";
pub const DEFAULT_AUTH_TOKEN_TTL_SECS: i64 = 3600;

const CART_ID_AAD: &[u8] = b"configurator/cart-id/v1";
const AUTH_TOKEN_AAD: &[u8] = b"configurator/auth-token/v1";
const NONCE_BYTES: usize = 8;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartIdEnvelope {
    user_id: String,
    design_id: String,
    timestamp: i64,
    nonce: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokenEnvelope {
    user_id: String,
    cart_id: String,
    expires_at: i64,
    issued_at: i64,
}

/// Result of decoding a cart id. Invalid tokens carry empty fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartIdClaims {
    pub user_id: String,
    pub design_id: String,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    pub is_valid: bool,
}

impl CartIdClaims {
    fn invalid() -> Self {
        Self {
            user_id: String::new(),
            design_id: String::new(),
            timestamp: 0,
            is_valid: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthTokenRequest {
    pub user_id: String,
    pub cart_id: String,
    /// Falls back to the codec's default TTL when `None`.
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenClaims {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<String>,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl AuthTokenClaims {
    fn invalid() -> Self {
        Self {
            is_valid: false,
            user_id: None,
            cart_id: None,
            is_expired: false,
            expires_at: None,
        }
    }
}

/// Issues and opens the opaque tokens handed to browsers and the vendor.
///
/// Decoding never fails loudly: anything that does not decrypt and parse is
/// reported as an invalid claim set.
#[derive(Debug, Clone)]
pub struct OpaqueTokenCodec {
    crypto: CryptoCodec,
    default_ttl_secs: i64,
}

impl OpaqueTokenCodec {
    pub fn new(crypto: CryptoCodec) -> Self {
        Self {
            crypto,
            default_ttl_secs: DEFAULT_AUTH_TOKEN_TTL_SECS,
        }
    }

    pub fn with_default_ttl(mut self, ttl_secs: i64) -> Self {
        self.default_ttl_secs = ttl_secs;
        self
    }

    pub fn encode_cart_id(
        &self,
        user_id: &str,
        design_id: &str,
        timestamp: Option<i64>,
    ) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let envelope = CartIdEnvelope {
            user_id: user_id.to_string(),
            design_id: design_id.to_string(),
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
            nonce: hex::encode(nonce),
        };
        self.seal(CART_ID_PREFIX, CART_ID_AAD, &envelope)
    }

    pub fn decode_cart_id(&self, token: &str) -> CartIdClaims {
        match self.open::<CartIdEnvelope>(token, CART_ID_PREFIX, CART_ID_AAD) {
            Ok(envelope) if !envelope.user_id.is_empty() && !envelope.design_id.is_empty() => {
                CartIdClaims {
                    user_id: envelope.user_id,
                    design_id: envelope.design_id,
                    timestamp: envelope.timestamp,
                    is_valid: true,
                }
            }
            Ok(_) => CartIdClaims::invalid(),
            Err(e) => {
                debug!(error = %e, "Rejected cart id token");
                CartIdClaims::invalid()
            }
        }
    }

    pub fn encode_auth_token(&self, request: &AuthTokenRequest) -> Result<String, CryptoError> {
        let issued_at = Utc::now().timestamp_millis();
        let ttl_secs = request.expires_in_seconds.unwrap_or(self.default_ttl_secs);
        let envelope = AuthTokenEnvelope {
            user_id: request.user_id.clone(),
            cart_id: request.cart_id.clone(),
            expires_at: issued_at.saturating_add(ttl_secs.saturating_mul(1000)),
            issued_at,
        };
        self.seal(AUTH_TOKEN_PREFIX, AUTH_TOKEN_AAD, &envelope)
    }

    /// Expiry is judged against the clock at verification time.
    pub fn decode_auth_token(&self, token: &str) -> AuthTokenClaims {
        let envelope = match self.open::<AuthTokenEnvelope>(token, AUTH_TOKEN_PREFIX, AUTH_TOKEN_AAD)
        {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "Rejected auth token");
                return AuthTokenClaims::invalid();
            }
        };

        let is_expired = Utc::now().timestamp_millis() > envelope.expires_at;
        AuthTokenClaims {
            is_valid: !is_expired,
            user_id: Some(envelope.user_id),
            cart_id: Some(envelope.cart_id),
            is_expired,
            expires_at: Some(envelope.expires_at),
        }
    }

    fn seal<T: Serialize>(&self, prefix: &str, aad: &[u8], envelope: &T) -> Result<String, CryptoError> {
        let plaintext =
            serde_json::to_vec(envelope).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let payload = self.crypto.encrypt_with_aad(&plaintext, aad)?;
        let wire =
            serde_json::to_vec(&payload).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok(format!("{prefix}{}", URL_SAFE_NO_PAD.encode(wire)))
    }

    fn open<T: for<'de> Deserialize<'de>>(
        &self,
        token: &str,
        prefix: &str,
        aad: &[u8],
    ) -> Result<T, CryptoError> {
        let encoded = token
            .strip_prefix(prefix)
            .ok_or_else(|| CryptoError::Malformed("unexpected token prefix".into()))?;
        let wire = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CryptoError::Malformed("token is not base64url".into()))?;
        let payload: EncryptedPayload = serde_json::from_slice(&wire)
            .map_err(|_| CryptoError::Malformed("token payload is not an envelope".into()))?;
        let plaintext = self.crypto.decrypt_with_aad(&payload, aad)?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| CryptoError::Malformed("token claims are not valid".into()))
    }
}
