//! GateKit Crypto - key material, credentials-at-rest, webhook signing
//!
//! Three independent concerns live here:
//! - API-key generation and irreversible hashing (`api_key`)
//! - AES-256-GCM encryption of platform credentials (`credentials`)
//! - HMAC-SHA256 webhook signatures (`signature`)

pub mod api_key;
pub mod credentials;
pub mod signature;

pub use api_key::{generate_api_key, hash_api_key, key_prefix, key_suffix, GeneratedKey};
pub use credentials::CredentialCipher;
pub use signature::{sign_payload, verify_signature, SIGNATURE_HEADER};
