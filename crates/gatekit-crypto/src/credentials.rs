//! Credentials-at-rest encryption
//!
//! Platform credentials are stored only as AES-256-GCM ciphertext under a
//! process-wide master key. The serialized layout is `nonce ∥ tag ∥ body`,
//! base64-encoded; decryption is the only way back to the credentials
//! object, and decrypted values live only in process memory.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;

use gatekit_core::{GatewayError, GatewayResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM cipher bound to the configured master key
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build from the configured master key, accepted as base64 or hex of
    /// exactly 32 bytes.
    pub fn new(master_key: &str) -> GatewayResult<Self> {
        let key_bytes = decode_master_key(master_key)?;
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a credentials object to the stored string form
    pub fn encrypt(&self, credentials: &serde_json::Value) -> GatewayResult<String> {
        let plaintext = serde_json::to_vec(credentials)
            .map_err(|e| GatewayError::Crypto(format!("serialize credentials: {e}")))?;
        self.encrypt_bytes(&plaintext)
    }

    /// Encrypt raw bytes to `base64(nonce ∥ tag ∥ body)`
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> GatewayResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag after the body; re-order to nonce|tag|body
        let mut body = self
            .cipher
            .encrypt(nonce, Payload::from(plaintext))
            .map_err(|_| GatewayError::Crypto("encryption failed".into()))?;
        let tag = body.split_off(body.len() - TAG_LEN);

        let mut out = Vec::with_capacity(NONCE_LEN + TAG_LEN + body.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&body);
        Ok(base64::engine::general_purpose::STANDARD.encode(out))
    }

    /// Decrypt the stored string form back to the credentials object
    pub fn decrypt(&self, ciphertext: &str) -> GatewayResult<serde_json::Value> {
        let plaintext = self.decrypt_bytes(ciphertext)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| GatewayError::Crypto(format!("deserialize credentials: {e}")))
    }

    /// Decrypt `base64(nonce ∥ tag ∥ body)` to raw bytes
    pub fn decrypt_bytes(&self, ciphertext: &str) -> GatewayResult<Vec<u8>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| GatewayError::Crypto("ciphertext is not valid base64".into()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(GatewayError::Crypto("ciphertext too short".into()));
        }

        let (nonce_bytes, rest) = raw.split_at(NONCE_LEN);
        let (tag, body) = rest.split_at(TAG_LEN);

        let mut sealed = Vec::with_capacity(body.len() + TAG_LEN);
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(tag);

        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), Payload::from(sealed.as_slice()))
            .map_err(|_| GatewayError::Crypto("decryption failed".into()))
    }
}

fn decode_master_key(master_key: &str) -> GatewayResult<[u8; 32]> {
    let decoded = if master_key.len() == 64 && master_key.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(master_key).map_err(|_| GatewayError::Config("invalid hex master key".into()))?
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(master_key)
            .map_err(|_| GatewayError::Config("master key is neither hex nor base64".into()))?
    };

    decoded
        .as_slice()
        .try_into()
        .map_err(|_| GatewayError::Config("master key must decode to 32 bytes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_cipher() -> CredentialCipher {
        // 32 zero bytes, hex-encoded
        CredentialCipher::new(&"00".repeat(32)).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = test_cipher();
        let credentials = json!({"token": "123456:ABCDEF", "botUsername": "demo_bot"});

        let sealed = cipher.encrypt(&credentials).unwrap();
        let opened = cipher.decrypt(&sealed).unwrap();
        assert_eq!(opened, credentials);
    }

    #[test]
    fn test_ciphertexts_differ_per_call() {
        let cipher = test_cipher();
        let credentials = json!({"token": "t"});
        let a = cipher.encrypt(&credentials).unwrap();
        let b = cipher.encrypt(&credentials).unwrap();
        assert_ne!(a, b); // fresh nonce every call
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(&json!({"token": "t"})).unwrap();

        let mut raw = base64::engine::general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(raw);

        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let cipher = test_cipher();
        assert!(cipher.decrypt_bytes("AAAA").is_err());
    }

    #[test]
    fn test_base64_master_key_accepted() {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        assert!(CredentialCipher::new(&key).is_ok());
    }

    #[test]
    fn test_wrong_length_master_key_rejected() {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 16]);
        assert!(CredentialCipher::new(&key).is_err());
    }
}
