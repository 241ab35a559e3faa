//! Platform adapter SPI
//!
//! An adapter satisfies three orthogonal contracts: identity (descriptor),
//! lifecycle (connection management + platform-config lifecycle hooks), and
//! I/O (payload translation + sending). Within a single connection key there
//! is at most one live connection instance; `send_message` must be safe to
//! call concurrently, with no ordering guarantee across calls.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gatekit_core::{
    ConnectionKey, Envelope, PlatformConfig, PlatformLifecycleEvent, ReplyPayload,
};

use crate::error::{PlatformError, PlatformResult, SendError, SendReceipt};

/// How an adapter talks to its platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Websocket,
    Webhook,
    Polling,
}

/// Capability tags an adapter may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    SendMessage,
    ReceiveMessage,
    EditMessage,
    DeleteMessage,
    Attachments,
    Embeds,
    Buttons,
    Reactions,
    Threads,
}

/// Static adapter identity
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub connection_type: ConnectionType,
    pub capabilities: Vec<Capability>,
}

/// Where adapters publish inbound envelopes. The event bus implements this;
/// adapters hold a shared reference and know nothing else about the
/// pipelines.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn publish(&self, envelope: Envelope);
}

/// Inbound webhook dispatch context, assembled by the registry after token
/// validation. Credentials arrive decrypted.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub config: PlatformConfig,
    pub credentials: serde_json::Value,
    pub body: serde_json::Value,
    pub headers: HashMap<String, String>,
}

/// One live platform connection
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Deliver a reply to the envelope's thread. Concurrency-safe; ordering
    /// across concurrent calls is not guaranteed.
    async fn send_message(
        &self,
        envelope: &Envelope,
        reply: &ReplyPayload,
    ) -> Result<SendReceipt, SendError>;

    /// Release the connection's resources
    async fn close(&self);

    /// Downcast hook for adapter-specific connection state
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A registered platform provider, owning all live connections for its
/// platform across every (project, platform-config) pair.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    fn descriptor(&self) -> ProviderDescriptor;

    /// Called once at registry boot
    async fn initialize(&self) -> PlatformResult<()> {
        Ok(())
    }

    /// Idempotent connection creation. Identical credentials return the
    /// existing live connection; changed credentials tear down and rebuild.
    /// Creation is single-flighted per key.
    async fn create_connection(
        &self,
        key: &ConnectionKey,
        config: &PlatformConfig,
        credentials: &serde_json::Value,
    ) -> PlatformResult<std::sync::Arc<dyn PlatformConnection>>;

    /// Live connection lookup; never creates
    async fn get_connection(
        &self,
        key: &ConnectionKey,
    ) -> Option<std::sync::Arc<dyn PlatformConnection>>;

    /// Release a connection; safe on an absent key
    async fn remove_connection(&self, key: &ConnectionKey);

    /// PlatformConfig lifecycle hook (created/activated/updated/deactivated/
    /// deleted), invoked by the registry with decrypted credentials.
    async fn on_platform_event(&self, _event: &PlatformLifecycleEvent) -> PlatformResult<()> {
        Ok(())
    }

    /// Translate a provider-native payload into zero or more envelopes
    fn to_envelope(
        &self,
        payload: &serde_json::Value,
        config: &PlatformConfig,
    ) -> PlatformResult<Vec<Envelope>>;

    /// Webhook route contract for webhook-class adapters. The path pattern
    /// always contains a `:webhookToken` segment.
    fn webhook_path(&self) -> Option<String> {
        None
    }

    /// Handle a dispatched inbound webhook
    async fn handle_webhook(&self, request: WebhookRequest) -> PlatformResult<serde_json::Value> {
        let _ = request;
        Err(PlatformError::Unsupported(format!(
            "{} does not accept webhooks",
            self.descriptor().name
        )))
    }

    /// Provider health; a provider with zero connections is healthy (idle)
    async fn is_healthy(&self) -> bool {
        true
    }

    /// Number of live connections, for health reporting
    async fn connection_count(&self) -> usize;

    /// Tear down every connection and refuse new work
    async fn shutdown(&self);
}
