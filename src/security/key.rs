use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::fmt;
use tracing::warn;
use zeroize::Zeroizing;

use super::CryptoError;

/// Length of the process-wide secret (256 bits).
pub const SECRET_KEY_LEN: usize = 32;

/// Environments in which a missing secret is fatal.
const PRODUCTION_LIKE_ENVIRONMENTS: [&str; 3] = ["production", "prod", "staging"];

/// The single managed secret every token, cipher and keyed hash is derived from.
///
/// Loaded once during bootstrap and shared read-only afterwards. The bytes are
/// wiped when the last copy is dropped.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; SECRET_KEY_LEN]>);

impl SecretKey {
    /// Wraps raw key material. Anything other than exactly 32 bytes is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SECRET_KEY_LEN {
            return Err(CryptoError::InvalidKey {
                expected: SECRET_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Parses a configured key: 64 hex characters, or standard base64 of 32 bytes.
    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();
        let is_hex = trimmed.len() == SECRET_KEY_LEN * 2
            && trimmed.chars().all(|c| c.is_ascii_hexdigit());

        let bytes = if is_hex {
            hex::decode(trimmed)
                .map_err(|e| CryptoError::Malformed(format!("secret key hex: {e}")))?
        } else {
            STANDARD
                .decode(trimmed)
                .map_err(|e| CryptoError::Malformed(format!("secret key base64: {e}")))?
        };

        Self::from_bytes(&Zeroizing::new(bytes))
    }

    /// Fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        Self(key)
    }

    /// Resolves the process secret at startup.
    ///
    /// Production-like environments must configure a key. Everywhere else a
    /// random key is generated, which invalidates outstanding tokens on restart.
    pub fn load(configured: Option<&str>, environment: &str) -> Result<Self, CryptoError> {
        match configured.map(str::trim).filter(|k| !k.is_empty()) {
            Some(encoded) => Self::parse(encoded),
            None if is_production_like(environment) => {
                Err(CryptoError::MissingKey(environment.to_string()))
            }
            None => {
                warn!(
                    environment,
                    "No secret key configured; generated an ephemeral key. Tokens will not survive a restart."
                );
                Ok(Self::generate())
            }
        }
    }

    /// Derives an independent 256-bit subkey for one purpose.
    pub fn derive(&self, label: &str) -> Result<Zeroizing<[u8; SECRET_KEY_LEN]>, CryptoError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.0[..]).map_err(|_| {
            CryptoError::InvalidKey {
                expected: SECRET_KEY_LEN,
                actual: self.0.len(),
            }
        })?;
        mac.update(label.as_bytes());
        let mut out = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(**redacted**)")
    }
}

fn is_production_like(environment: &str) -> bool {
    PRODUCTION_LIKE_ENVIRONMENTS
        .iter()
        .any(|env| environment.eq_ignore_ascii_case(env))
}
