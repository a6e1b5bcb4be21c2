use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{fmt, time::Duration};

use super::CryptoError;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_CSRF_MAX_AGE: Duration = Duration::from_secs(3600);

/// Stateless CSRF tokens of the form `<timestamp_ms>.<hex hmac>`.
///
/// The MAC covers the session id and the timestamp, so a token only verifies
/// for the session it was issued to and only while it is younger than the
/// caller's max age.
#[derive(Clone)]
pub struct CsrfTokenizer {
    mac: HmacSha256,
}

impl CsrfTokenizer {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKey {
            expected: 32,
            actual: key.len(),
        })?;
        Ok(Self { mac })
    }

    pub fn issue(&self, session_id: &str) -> String {
        self.issue_at(session_id, Utc::now().timestamp_millis())
    }

    fn issue_at(&self, session_id: &str, timestamp_ms: i64) -> String {
        let tag = self.keyed(session_id, timestamp_ms).finalize().into_bytes();
        format!("{timestamp_ms}.{}", hex::encode(tag))
    }

    pub fn verify(&self, token: &str, session_id: &str, max_age: Duration) -> bool {
        if session_id.is_empty() {
            return false;
        }
        let Some((ts_part, hash_part)) = token.split_once('.') else {
            return false;
        };
        let Ok(timestamp_ms) = ts_part.parse::<i64>() else {
            return false;
        };
        let Ok(expected) = hex::decode(hash_part) else {
            return false;
        };

        let Some(age_ms) = Utc::now().timestamp_millis().checked_sub(timestamp_ms) else {
            return false;
        };
        if age_ms < 0 || age_ms as u128 >= max_age.as_millis() {
            return false;
        }

        self.keyed(session_id, timestamp_ms)
            .verify_slice(&expected)
            .is_ok()
    }

    fn keyed(&self, session_id: &str, timestamp_ms: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(&(session_id.len() as u64).to_be_bytes());
        mac.update(session_id.as_bytes());
        mac.update(&timestamp_ms.to_be_bytes());
        mac
    }
}

impl fmt::Debug for CsrfTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfTokenizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> CsrfTokenizer {
        CsrfTokenizer::new(&[3u8; 32]).unwrap()
    }

    #[test]
    fn binds_to_session() {
        let csrf = tokenizer();
        let token = csrf.issue("session-a");
        assert!(csrf.verify(&token, "session-a", DEFAULT_CSRF_MAX_AGE));
        assert!(!csrf.verify(&token, "session-b", DEFAULT_CSRF_MAX_AGE));
    }

    #[test]
    fn zero_max_age_always_fails() {
        let csrf = tokenizer();
        let token = csrf.issue("session-a");
        assert!(!csrf.verify(&token, "session-a", Duration::ZERO));
    }

    #[test]
    fn stale_and_future_tokens_fail() {
        let csrf = tokenizer();
        let now = Utc::now().timestamp_millis();

        let stale = csrf.issue_at("s", now - 2 * 3_600_000);
        assert!(!csrf.verify(&stale, "s", DEFAULT_CSRF_MAX_AGE));

        let future = csrf.issue_at("s", now + 60_000);
        assert!(!csrf.verify(&future, "s", DEFAULT_CSRF_MAX_AGE));
    }

    #[test]
    fn altered_hash_or_timestamp_fails() {
        let csrf = tokenizer();
        let token = csrf.issue("s");
        let (ts, hash) = token.split_once('.').unwrap();

        let mut bad_hash = hash.to_string();
        let first = bad_hash.remove(0);
        bad_hash.insert(0, if first == '0' { '1' } else { '0' });
        assert!(!csrf.verify(&format!("{ts}.{bad_hash}"), "s", DEFAULT_CSRF_MAX_AGE));

        let earlier: i64 = ts.parse::<i64>().unwrap() - 1;
        assert!(!csrf.verify(&format!("{earlier}.{hash}"), "s", DEFAULT_CSRF_MAX_AGE));

        assert!(!csrf.verify("garbage", "s", DEFAULT_CSRF_MAX_AGE));
        assert!(!csrf.verify(&token, "", DEFAULT_CSRF_MAX_AGE));
    }

    #[test]
    fn extreme_timestamps_fail_without_panicking() {
        let csrf = tokenizer();
        let hash = "00".repeat(32);
        for ts in [i64::MIN, i64::MIN + 1, i64::MAX, -1] {
            assert!(!csrf.verify(&format!("{ts}.{hash}"), "s", DEFAULT_CSRF_MAX_AGE));
            assert!(!csrf.verify(&format!("{ts}.{hash}"), "s", Duration::MAX));
        }
    }

    #[test]
    fn other_key_cannot_forge() {
        let other = CsrfTokenizer::new(&[4u8; 32]).unwrap();
        let token = other.issue("s");
        assert!(!tokenizer().verify(&token, "s", DEFAULT_CSRF_MAX_AGE));
    }
}
