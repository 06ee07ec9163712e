use http::Method;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest identifying one idempotent request.
///
/// Derived from the method, path, raw body and idempotency key. Each field is
/// length-prefixed before hashing so distinct tuples never produce the same
/// hash input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn derive(method: &Method, path: &str, body: &[u8], idempotency_key: &str) -> Self {
        let mut hasher = Sha256::new();

        for field in [
            method.as_str().as_bytes(),
            path.as_bytes(),
            body,
            idempotency_key.as_bytes(),
        ] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"example_name":"a","example_content":"b"}"#;

    #[test]
    fn test_fingerprint_consistency() {
        let first = Fingerprint::derive(&Method::POST, "/examples/", BODY, "abc123");
        let second = Fingerprint::derive(&Method::POST, "/examples/", BODY, "abc123");

        assert_eq!(first, second);
        // SHA-256 produces 64 hex chars
        assert_eq!(first.as_str().len(), 64);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_each_field_changes_fingerprint() {
        let base = Fingerprint::derive(&Method::POST, "/examples/", BODY, "abc123");

        let variants = [
            Fingerprint::derive(&Method::PUT, "/examples/", BODY, "abc123"),
            Fingerprint::derive(&Method::POST, "/examples/1", BODY, "abc123"),
            Fingerprint::derive(&Method::POST, "/examples/", b"{}", "abc123"),
            Fingerprint::derive(&Method::POST, "/examples/", BODY, "abc124"),
        ];

        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // Plain concatenation would hash both of these as "POST/ab".
        let first = Fingerprint::derive(&Method::POST, "/a", b"b", "key");
        let second = Fingerprint::derive(&Method::POST, "/", b"ab", "key");

        assert_ne!(first, second);
    }

    #[test]
    fn test_empty_body() {
        let with_empty = Fingerprint::derive(&Method::POST, "/examples/", b"", "k");
        let with_space = Fingerprint::derive(&Method::POST, "/examples/", b" ", "k");

        assert_ne!(with_empty, with_space);
    }
}
