use serde::Serialize;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 over a canonical JSON rendering.
///
/// Object keys are sorted, array elements are canonicalized and then sorted by
/// their canonical text, and integral floats print as integers. Two values that
/// differ only in key order or array order produce the same digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityHasher;

impl IntegrityHasher {
    pub fn new() -> Self {
        Self
    }

    pub fn canonicalize(value: &Value) -> String {
        let mut out = String::new();
        write_canonical(value, &mut out);
        out
    }

    /// 64 lowercase hex characters.
    pub fn digest(&self, value: &Value) -> String {
        hex::encode(Sha256::digest(Self::canonicalize(value).as_bytes()))
    }

    pub fn digest_of<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        Ok(self.digest(&serde_json::to_value(value)?))
    }

    pub fn verify(&self, value: &Value, expected_digest: &str) -> bool {
        let actual = self.digest(value);
        let expected = expected_digest.trim().to_ascii_lowercase();
        actual.len() == expected.len() && bool::from(actual.as_bytes().ct_eq(expected.as_bytes()))
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        // Display on a string value yields the escaped JSON literal
        Value::String(_) => out.push_str(&value.to_string()),
        Value::Array(items) => {
            let mut rendered: Vec<String> = items.iter().map(IntegrityHasher::canonicalize).collect();
            rendered.sort_unstable();
            out.push('[');
            out.push_str(&rendered.join(","));
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn canonical_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => format!("{f}"),
        None => n.to_string(),
    }
}
