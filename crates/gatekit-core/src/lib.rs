// GateKit Core - Foundation types and traits for the GateKit messaging gateway
//
// This crate defines the canonical envelope, the target model, the persisted
// entity shapes, the scope vocabulary, and the lifecycle/event types shared
// by every other GateKit crate.

pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod logging;
pub mod message;
pub mod model;
pub mod pagination;
pub mod principal;
pub mod scopes;
pub mod target;

// Re-export core types
pub use config::{GatewayConfig, JwtConfig, RateLimitConfig};
pub use envelope::{
    Envelope, EnvelopeAction, EnvelopeBuilder, EnvelopeMessage, EnvelopeProvider,
    EnvelopeReaction, EnvelopeUser, ENVELOPE_VERSION,
};
pub use error::{GatewayError, GatewayResult};
pub use events::{
    EventKind, EventRecord, PlatformLifecycleEvent, PlatformLifecycleKind, EVENT_CATALOG,
};
pub use logging::{PlatformLogSink, PlatformLogger};
pub use message::{
    Attachment, Button, Embed, EmbedField, ReplyPayload, SendContent, SendMetadata, SendOptions,
};
pub use model::{
    ApiKey, ConnectionKey, Environment, Identity, IdentityAlias, LinkMethod, LogCategory,
    LogLevel, MemberRole, MessageKind, PlatformConfig, PlatformLog, Project, ProjectMember,
    ReactionKind, ReceivedMessage, ReceivedReaction, SentMessage, SentStatus, Webhook,
    WebhookDelivery, WebhookDeliveryStatus,
};
pub use pagination::Pagination;
pub use principal::{Principal, WhoAmI, WhoAmIKey, WhoAmIProject, WhoAmIUser};
pub use scopes::{Scope, ScopeSet};
pub use target::{MessageTarget, TargetInput, TargetKind};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default page size for list queries
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Hard cap on page size for list queries
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Hard cap on page size for platform-log queries
pub const MAX_LOG_PAGE_LIMIT: u32 = 1000;
