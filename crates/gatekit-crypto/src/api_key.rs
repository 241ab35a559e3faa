//! API-key generation and hashing
//!
//! Token shape: `gk_{env}_{base62(192-bit random)}`. The stored form is the
//! hex SHA-256 of the whole token plus the first 8 / last 4 characters for
//! masked display. The plaintext exists only in the creation response.

use rand::RngCore;
use sha2::{Digest, Sha256};

use gatekit_core::Environment;

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Visible prefix length on stored keys
pub const KEY_PREFIX_LEN: usize = 8;

/// Visible suffix length on stored keys
pub const KEY_SUFFIX_LEN: usize = 4;

/// Freshly minted key with its derived stored fields
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Full plaintext token; returned to the caller exactly once
    pub token: String,
    pub hash: String,
    pub prefix: String,
    pub suffix: String,
}

/// Mint a new API key for a project environment
pub fn generate_api_key(environment: Environment) -> GeneratedKey {
    let mut material = [0u8; 24]; // 192 bits
    rand::thread_rng().fill_bytes(&mut material);

    let token = format!("gk_{}_{}", environment.key_segment(), base62_encode(&material));
    GeneratedKey {
        hash: hash_api_key(&token),
        prefix: key_prefix(&token),
        suffix: key_suffix(&token),
        token,
    }
}

/// Irreversible stored form: hex-encoded SHA-256 of the whole token
pub fn hash_api_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 8 visible characters
pub fn key_prefix(token: &str) -> String {
    token.chars().take(KEY_PREFIX_LEN).collect()
}

/// Last 4 visible characters
pub fn key_suffix(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    chars[chars.len().saturating_sub(KEY_SUFFIX_LEN)..]
        .iter()
        .collect()
}

/// Base62-encode a big-endian byte string via repeated division
fn base62_encode(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = bytes.to_vec();
    let mut out = Vec::new();

    while digits.iter().any(|&d| d != 0) {
        let mut remainder: u32 = 0;
        for digit in digits.iter_mut() {
            let value = (remainder << 8) | *digit as u32;
            *digit = (value / 62) as u8;
            remainder = value % 62;
        }
        out.push(BASE62_ALPHABET[remainder as usize]);
    }

    if out.is_empty() {
        out.push(BASE62_ALPHABET[0]);
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape_per_environment() {
        assert!(generate_api_key(Environment::Development).token.starts_with("gk_dev_"));
        assert!(generate_api_key(Environment::Staging).token.starts_with("gk_stg_"));
        assert!(generate_api_key(Environment::Production).token.starts_with("gk_live_"));
    }

    #[test]
    fn test_hash_is_stable() {
        let key = generate_api_key(Environment::Development);
        assert_eq!(hash_api_key(&key.token), key.hash);
        assert_eq!(hash_api_key(&key.token), hash_api_key(&key.token));
        assert_eq!(key.hash.len(), 64); // hex sha256
    }

    #[test]
    fn test_prefix_and_suffix_are_substrings() {
        let key = generate_api_key(Environment::Development);
        assert_eq!(key.prefix.len(), KEY_PREFIX_LEN);
        assert_eq!(key.suffix.len(), KEY_SUFFIX_LEN);
        assert!(key.token.starts_with(&key.prefix));
        assert!(key.token.ends_with(&key.suffix));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_api_key(Environment::Development);
        let b = generate_api_key(Environment::Development);
        assert_ne!(a.token, b.token);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_base62_known_values() {
        assert_eq!(base62_encode(&[0]), "0");
        assert_eq!(base62_encode(&[61]), "z");
        assert_eq!(base62_encode(&[1, 0]), "48"); // 256 = 4*62 + 8
    }

    #[test]
    fn test_base62_output_is_alphanumeric() {
        let key = generate_api_key(Environment::Production);
        let body = key.token.strip_prefix("gk_live_").unwrap();
        assert!(body.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
