//! GateKit Platforms - adapter SPI, registry, and concrete adapters
//!
//! This crate defines the contracts every messaging platform integration
//! satisfies:
//! - Identity: name, display name, connection type, capability tags
//! - Lifecycle: connection create/get/remove with single-flight creation,
//!   platform-config lifecycle hooks, shutdown
//! - I/O: provider payload -> Envelope translation, envelope -> remote send
//!
//! The registry routes inbound webhooks to the owning adapter and
//! propagates PlatformConfig lifecycle events with decrypted credentials.

pub mod discord;
pub mod error;
pub mod pool;
pub mod registry;
pub mod spi;
pub mod telegram;
pub mod whatsapp_evo;

pub use discord::{DiscordProvider, MAX_DISCORD_CONNECTIONS};
pub use error::{PlatformError, PlatformResult, SendError, SendReceipt};
pub use pool::ConnectionPool;
pub use registry::{PlatformRegistry, RegistryHealth};
pub use spi::{
    Capability, ConnectionType, EnvelopeSink, PlatformConnection, PlatformProvider,
    ProviderDescriptor, WebhookRequest,
};
pub use telegram::TelegramProvider;
pub use whatsapp_evo::{EvolutionProvider, EVOLUTION_INSTANCE};
