//! Outgoing request signing using HMAC-SHA256.
//!
//! When a shared secret is configured, every forwarded request carries two
//! headers so the receiving API can check freshness and authenticity:
//!
//! - `X-Request-Timestamp`: unix time of the attempt
//! - `X-Request-Sign`: lowercase hex HMAC-SHA256 of `auth:{timestamp}:{url}`
//!   keyed with the secret
//!
//! The `url` is the destination URL without the forwarded query string, e.g.
//! `auth:1573554110:http://myhome.local/events/`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the unix timestamp used in the signature.
pub const TIMESTAMP_HEADER: &str = "X-Request-Timestamp";
/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "X-Request-Sign";

/// Builds the exact string that gets signed.
pub fn signing_payload(timestamp: i64, url: &str) -> String {
    format!("auth:{timestamp}:{url}")
}

/// Computes the hex HMAC-SHA256 signature for a timestamp and destination URL.
pub fn compute_signature(secret: &[u8], timestamp: i64, url: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(signing_payload(timestamp, url).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature produced by [`compute_signature`].
///
/// Returns `false` for malformed hex instead of panicking. The comparison is
/// constant-time.
///
/// # Examples
///
/// ```
/// use push_relay::signing::{compute_signature, verify_signature};
///
/// let sig = compute_signature(b"token", 1573554110, "https://api.example.com/push");
/// assert!(verify_signature(b"token", 1573554110, "https://api.example.com/push", &sig));
/// assert!(!verify_signature(b"other", 1573554110, "https://api.example.com/push", &sig));
/// ```
pub fn verify_signature(secret: &[u8], timestamp: i64, url: &str, signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(signing_payload(timestamp, url).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// The pair of authentication header values attached to one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub timestamp: i64,
    pub signature: String,
}

impl RequestSignature {
    /// Signs `url` at `timestamp`, or returns `None` when no secret is configured.
    pub fn sign(secret: Option<&str>, timestamp: i64, url: &str) -> Option<Self> {
        let secret = secret.filter(|s| !s.is_empty())?;
        Some(RequestSignature {
            timestamp,
            signature: compute_signature(secret.as_bytes(), timestamp, url),
        })
    }

    /// Header name/value pairs in the order they are sent.
    pub fn headers(&self) -> [(&'static str, String); 2] {
        [
            (TIMESTAMP_HEADER, self.timestamp.to_string()),
            (SIGNATURE_HEADER, self.signature.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn payload_layout() {
        assert_eq!(
            signing_payload(1573554110, "http://myhome.local/events/"),
            "auth:1573554110:http://myhome.local/events/"
        );
    }

    /// Vector computed independently with Python's `hmac` module.
    #[test]
    fn known_vector() {
        let sig = compute_signature(b"secret", 1573554110, "http://myhome.local/events/");
        assert_eq!(
            sig,
            "9a7a7f31b48f09032f147d9cd08a422311201475dd8a69896ef07a115fcca163"
        );
    }

    #[test]
    fn known_vector_empty_inputs() {
        assert_eq!(
            compute_signature(b"", 0, ""),
            "5e773b30ae50d085567cac415fb1a888a6bf8fc3f022b4a2457cce6407243af0"
        );
    }

    #[test]
    fn signature_is_lowercase_hex_of_32_bytes() {
        let sig = compute_signature(b"k", 1, "https://api.example.com/push");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn no_secret_means_no_signature() {
        assert_eq!(RequestSignature::sign(None, 1, "https://x"), None);
        assert_eq!(RequestSignature::sign(Some(""), 1, "https://x"), None);
    }

    #[test]
    fn headers_carry_timestamp_and_signature() {
        let sig = RequestSignature::sign(Some("token"), 42, "https://api.example.com/push").unwrap();
        let [(ts_name, ts), (sig_name, value)] = sig.headers();
        assert_eq!(ts_name, TIMESTAMP_HEADER);
        assert_eq!(ts, "42");
        assert_eq!(sig_name, SIGNATURE_HEADER);
        assert_eq!(value, compute_signature(b"token", 42, "https://api.example.com/push"));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify_signature(b"k", 1, "u", ""));
        assert!(!verify_signature(b"k", 1, "u", "zz"));
        assert!(!verify_signature(b"k", 1, "u", "abc"));
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let sig = compute_signature(b"k", 7, "https://x/y").to_uppercase();
        assert!(verify_signature(b"k", 7, "https://x/y", &sig));
    }

    proptest! {
        #[test]
        fn prop_deterministic(secret: Vec<u8>, ts: i64, url in "\\PC{0,60}") {
            prop_assert_eq!(
                compute_signature(&secret, ts, &url),
                compute_signature(&secret, ts, &url)
            );
        }

        #[test]
        fn prop_sign_verify_roundtrip(secret: Vec<u8>, ts: i64, url in "\\PC{0,60}") {
            let sig = compute_signature(&secret, ts, &url);
            prop_assert!(verify_signature(&secret, ts, &url, &sig));
        }

        #[test]
        fn prop_different_secret_changes_signature(
            s1: Vec<u8>, s2: Vec<u8>, ts: i64, url in "\\PC{0,60}"
        ) {
            // HMAC pads short keys with zeros, so keys differing only in
            // trailing zero bytes are equivalent.
            let trim = |s: &[u8]| s.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            prop_assume!(s1[..trim(&s1)] != s2[..trim(&s2)]);
            prop_assert_ne!(compute_signature(&s1, ts, &url), compute_signature(&s2, ts, &url));
        }

        #[test]
        fn prop_different_timestamp_changes_signature(secret: Vec<u8>, t1: i64, t2: i64) {
            prop_assume!(t1 != t2);
            prop_assert_ne!(
                compute_signature(&secret, t1, "https://api.example.com/push"),
                compute_signature(&secret, t2, "https://api.example.com/push")
            );
        }

        #[test]
        fn prop_different_url_changes_signature(
            secret: Vec<u8>, ts: i64, u1 in "\\PC{0,40}", u2 in "\\PC{0,40}"
        ) {
            prop_assume!(u1 != u2);
            prop_assert_ne!(compute_signature(&secret, ts, &u1), compute_signature(&secret, ts, &u2));
        }

        #[test]
        fn prop_malformed_signature_never_panics(sig: String, ts: i64) {
            let _ = verify_signature(b"k", ts, "https://x", &sig);
        }
    }
}
