//! GateKit Store - persistence abstraction for the gateway
//!
//! Repositories are traits; the default backend is a lock-free in-memory
//! implementation built on DashMap. Persistent backends can be added behind
//! the same traits without touching callers.
//!
//! ## Guarantees
//!
//! - Uniqueness constraints surface as [`StoreError::Duplicate`] with the
//!   violated constraint named, so callers can downgrade expected
//!   duplicates (webhook redeliveries) instead of failing ingest.
//! - The API-key roll is atomic: revoke-later on the old key and insert of
//!   the new key happen under one lock.
//! - `SentMessage.status` only ever moves `pending -> sent | failed`.

pub mod error;
pub mod identity;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use identity::IdentityResolver;
pub use memory::MemoryStore;
pub use traits::{
    ApiKeyStore, IdentityStore, MessageStore, PlatformConfigStore, PlatformLogStore,
    ProjectStore, ReactionStore, Store, WebhookStore,
};
pub use types::{
    DeliveryFilter, LogFilter, LogStats, LogVolume, MessageStats, ReactionGroup, ReactionUser,
    ReceivedMessageFilter,
};
