//! Shared application state
//!
//! Explicit constructor wiring: the ownership graph is bus (leaf) and store
//! (leaf) at the bottom, registry owning adapters above them, pipelines
//! above those, and this state struct at the top. No service locator.

use std::sync::Arc;

use gatekit_core::GatewayConfig;
use gatekit_crypto::CredentialCipher;
use gatekit_pipeline::{EventBus, OutboundPipeline, WebhookDispatcher};
use gatekit_platforms::PlatformRegistry;
use gatekit_store::Store;

use crate::ratelimit::RouteLimiters;

/// Everything the HTTP handlers reach for
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn Store>,
    pub cipher: CredentialCipher,
    pub bus: Arc<EventBus>,
    pub registry: Arc<PlatformRegistry>,
    pub outbound: Arc<OutboundPipeline>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub limiters: Arc<RouteLimiters>,
}
