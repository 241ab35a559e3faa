//! Domain services sitting between the HTTP handlers and the store

pub mod keys;

pub use keys::{ApiKeyService, MintedKey, ROLL_GRACE_HOURS};
