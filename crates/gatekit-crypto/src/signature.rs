//! Webhook delivery signatures
//!
//! Outgoing subscriber deliveries carry `X-GateKit-Signature: sha256=<hex>`
//! computed as HMAC-SHA256 over the exact raw body bytes. Verification is
//! constant-time via `Mac::verify_slice`; we sign on the way out, receivers
//! (and our tests) verify.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature
pub const SIGNATURE_HEADER: &str = "X-GateKit-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature header value for a raw body
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail here
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header value against a raw body, in constant time
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_part) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_part) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let body = br#"{"event":"message.received","project_id":"p1"}"#;
        let signature = sign_payload("secret-S", body);
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature("secret-S", body, &signature));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let body = b"payload";
        let signature = sign_payload("secret-a", body);
        assert!(!verify_signature("secret-b", body, &signature));
    }

    #[test]
    fn test_modified_body_fails() {
        let signature = sign_payload("s", b"payload");
        assert!(!verify_signature("s", b"payload!", &signature));
    }

    #[test]
    fn test_malformed_header_fails() {
        assert!(!verify_signature("s", b"x", "md5=abcd"));
        assert!(!verify_signature("s", b"x", "sha256=zzzz"));
        assert!(!verify_signature("s", b"x", ""));
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let signature = sign_payload("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            signature,
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }
}
