use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::CryptoError;

/// Nonce length (96 bits), fresh per encryption.
pub const NONCE_LEN: usize = 12;
/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;
/// ChaCha20 key length.
pub const KEY_LEN: usize = 32;

/// Output of [`CryptoCodec::encrypt`], hex-encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Authenticated encryption (ChaCha20-Poly1305).
///
/// Decryption either returns the exact plaintext or fails; a flipped bit in the
/// ciphertext, nonce or tag is always reported as [`CryptoError::Decryption`].
#[derive(Clone)]
pub struct CryptoCodec {
    cipher: ChaCha20Poly1305,
}

impl CryptoCodec {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CryptoError> {
        self.encrypt_with_aad(plaintext, b"")
    }

    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_with_aad(payload, b"")
    }

    /// Encrypts with associated data that must be presented again on decrypt.
    pub fn encrypt_with_aad(
        &self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<EncryptedPayload, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
            .map_err(|_| CryptoError::Encryption)?;

        Ok(EncryptedPayload {
            ciphertext: hex::encode(&buffer),
            iv: hex::encode(nonce),
            auth_tag: hex::encode(tag),
        })
    }

    pub fn decrypt_with_aad(
        &self,
        payload: &EncryptedPayload,
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let nonce = decode_field(&payload.iv, "iv", Some(NONCE_LEN))?;
        let tag = decode_field(&payload.auth_tag, "authTag", Some(TAG_LEN))?;
        let mut buffer = decode_field(&payload.ciphertext, "ciphertext", None)?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                aad,
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Decryption)?;

        Ok(buffer)
    }
}

impl fmt::Debug for CryptoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoCodec").finish_non_exhaustive()
    }
}

fn decode_field(value: &str, name: &str, expected_len: Option<usize>) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(value).map_err(|_| CryptoError::Malformed(format!("{name} is not hex")))?;
    match expected_len {
        Some(len) if bytes.len() != len => Err(CryptoError::Malformed(format!(
            "{name} must be {len} bytes"
        ))),
        _ => Ok(bytes),
    }
}
