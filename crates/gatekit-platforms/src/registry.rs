//! Platform registry
//!
//! Concurrency-safe `name -> provider` map plus the glue the rest of the
//! gateway talks to: webhook dispatch with token validation, lifecycle
//! propagation with decrypted credentials, connection auto-creation on
//! demand, and aggregated health.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gatekit_core::{
    ConnectionKey, GatewayError, GatewayResult, PlatformConfig, PlatformLifecycleEvent,
    PlatformLifecycleKind,
};
use gatekit_crypto::CredentialCipher;
use gatekit_store::PlatformConfigStore;

use crate::spi::{PlatformConnection, PlatformProvider, WebhookRequest};

/// Health of one registered provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub healthy: bool,
    pub connections: usize,
}

/// Aggregated registry health. A provider with zero connections is healthy
/// (idle).
#[derive(Debug, Clone, Serialize)]
pub struct RegistryHealth {
    pub healthy: bool,
    pub providers: Vec<ProviderHealth>,
}

/// Registry of platform providers
pub struct PlatformRegistry {
    providers: DashMap<String, Arc<dyn PlatformProvider>>,
    store: Arc<dyn PlatformConfigStore>,
    cipher: CredentialCipher,
}

impl PlatformRegistry {
    pub fn new(store: Arc<dyn PlatformConfigStore>, cipher: CredentialCipher) -> Self {
        Self {
            providers: DashMap::new(),
            store,
            cipher,
        }
    }

    /// Register a provider. Duplicate names overwrite with a warning.
    pub fn register(&self, provider: Arc<dyn PlatformProvider>) {
        let name = provider.descriptor().name.to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            warn!(platform = %name, "duplicate platform registration, overwriting");
        } else {
            info!(platform = %name, "platform registered");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PlatformProvider>> {
        self.providers.get(name).map(|p| p.clone())
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.key().clone()).collect()
    }

    /// Initialize every provider, then replay `activated` lifecycle events
    /// for all active configs. Connections stay cold until first use.
    pub async fn boot(&self) -> GatewayResult<()> {
        for provider in self.providers.iter() {
            provider.initialize().await.map_err(GatewayError::from)?;
        }
        let configs = self.store.list_active_platforms().await?;
        info!(count = configs.len(), "replaying lifecycle for active platform configs");
        for config in configs {
            if let Err(e) = self
                .dispatch_lifecycle(PlatformLifecycleKind::Activated, &config)
                .await
            {
                warn!(platform = %config.platform, config = %config.id, "boot lifecycle failed: {e}");
            }
        }
        Ok(())
    }

    /// Decrypt a config's credentials, with the webhook token merged in so
    /// adapters can build callback URLs.
    fn decrypt_credentials(&self, config: &PlatformConfig) -> GatewayResult<serde_json::Value> {
        let mut credentials = self.cipher.decrypt(&config.credentials_encrypted)?;
        if let Some(map) = credentials.as_object_mut() {
            map.insert(
                "webhookToken".to_string(),
                serde_json::Value::String(config.webhook_token.clone()),
            );
        }
        Ok(credentials)
    }

    /// Propagate a PlatformConfig lifecycle transition to its adapter
    pub async fn dispatch_lifecycle(
        &self,
        kind: PlatformLifecycleKind,
        config: &PlatformConfig,
    ) -> GatewayResult<()> {
        let provider = self.get(&config.platform).ok_or_else(|| {
            GatewayError::Platform(format!("unknown platform: {}", config.platform))
        })?;

        // Connection hygiene first: updates and teardowns must not leave a
        // stale instance serving old credentials.
        let key = config.connection_key();
        match kind {
            PlatformLifecycleKind::Updated
            | PlatformLifecycleKind::Deactivated
            | PlatformLifecycleKind::Deleted => {
                provider.remove_connection(&key).await;
            }
            PlatformLifecycleKind::Created | PlatformLifecycleKind::Activated => {}
        }

        let credentials = self.decrypt_credentials(config)?;
        let event = PlatformLifecycleEvent {
            kind,
            config: config.clone(),
            credentials,
        };
        provider.on_platform_event(&event).await.map_err(GatewayError::from)?;
        Ok(())
    }

    /// Live connection for a config, creating it on demand from decrypted
    /// credentials. Used by both webhook dispatch and the outbound worker.
    pub async fn ensure_connection(
        &self,
        config: &PlatformConfig,
    ) -> GatewayResult<Arc<dyn PlatformConnection>> {
        let provider = self.get(&config.platform).ok_or_else(|| {
            GatewayError::Platform(format!("unknown platform: {}", config.platform))
        })?;

        let key = config.connection_key();
        if let Some(connection) = provider.get_connection(&key).await {
            return Ok(connection);
        }

        debug!(%key, platform = %config.platform, "cold connection, creating on demand");
        let credentials = self.decrypt_credentials(config)?;
        provider
            .create_connection(&key, config, &credentials)
            .await
            .map_err(GatewayError::from)
    }

    /// Generic inbound webhook dispatcher.
    ///
    /// Order matters: the token must look like a UUID v4 before any store
    /// lookup happens, and mismatched platform or inactive config both read
    /// as not-found so probes learn nothing.
    pub async fn dispatch_webhook(
        &self,
        platform: &str,
        webhook_token: &str,
        body: serde_json::Value,
        headers: HashMap<String, String>,
    ) -> GatewayResult<serde_json::Value> {
        if !is_uuid_v4(webhook_token) {
            return Err(GatewayError::NotFound("webhook".into()));
        }

        let config = self
            .store
            .platform_by_webhook_token(webhook_token)
            .await?
            .ok_or_else(|| GatewayError::NotFound("webhook".into()))?;

        if config.platform != platform || !config.is_active {
            return Err(GatewayError::NotFound("webhook".into()));
        }

        let provider = self.get(platform).ok_or_else(|| {
            GatewayError::Platform(format!("unknown platform: {platform}"))
        })?;

        // Auto-connect on demand so a cold instance can answer immediately
        self.ensure_connection(&config).await?;

        let credentials = self.decrypt_credentials(&config)?;
        provider
            .handle_webhook(WebhookRequest {
                config,
                credentials,
                body,
                headers,
            })
            .await
            .map_err(GatewayError::from)
    }

    /// Aggregated health across providers
    pub async fn health(&self) -> RegistryHealth {
        let mut providers = Vec::new();
        let mut healthy = true;
        for entry in self.providers.iter() {
            let provider_healthy = entry.is_healthy().await;
            healthy &= provider_healthy;
            providers.push(ProviderHealth {
                name: entry.key().clone(),
                healthy: provider_healthy,
                connections: entry.connection_count().await,
            });
        }
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        RegistryHealth { healthy, providers }
    }

    /// Graceful shutdown: every provider drains its connections
    pub async fn shutdown(&self) {
        info!("shutting down platform registry");
        for provider in self.providers.iter() {
            provider.shutdown().await;
        }
    }
}

/// Webhook tokens must be UUID v4; anything else 404s before touching the
/// store.
pub fn is_uuid_v4(token: &str) -> bool {
    match Uuid::parse_str(token) {
        Ok(uuid) => uuid.get_version_num() == 4,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use gatekit_core::Envelope;
    use gatekit_store::MemoryStore;

    use crate::error::{PlatformError, PlatformResult};
    use crate::spi::{Capability, ConnectionType, ProviderDescriptor};

    struct NullProvider {
        name: &'static str,
    }

    #[async_trait]
    impl PlatformProvider for NullProvider {
        fn descriptor(&self) -> ProviderDescriptor {
            ProviderDescriptor {
                name: self.name,
                display_name: "Null",
                connection_type: ConnectionType::Webhook,
                capabilities: vec![Capability::SendMessage],
            }
        }

        async fn create_connection(
            &self,
            _key: &ConnectionKey,
            _config: &PlatformConfig,
            _credentials: &serde_json::Value,
        ) -> PlatformResult<Arc<dyn PlatformConnection>> {
            Err(PlatformError::Unsupported("null provider".into()))
        }

        async fn get_connection(
            &self,
            _key: &ConnectionKey,
        ) -> Option<Arc<dyn PlatformConnection>> {
            None
        }

        async fn remove_connection(&self, _key: &ConnectionKey) {}

        fn to_envelope(
            &self,
            _payload: &serde_json::Value,
            _config: &PlatformConfig,
        ) -> PlatformResult<Vec<Envelope>> {
            Ok(Vec::new())
        }

        async fn connection_count(&self) -> usize {
            0
        }

        async fn shutdown(&self) {}
    }

    fn registry() -> PlatformRegistry {
        let store = Arc::new(MemoryStore::new());
        let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
        PlatformRegistry::new(store, cipher)
    }

    #[test]
    fn test_uuid_v4_validation() {
        assert!(is_uuid_v4("3f6f0b2e-1111-4222-8333-444455556666"));
        assert!(!is_uuid_v4("not-a-uuid"));
        assert!(!is_uuid_v4(""));
        // v1 UUID rejected
        assert!(!is_uuid_v4("3f6f0b2e-1111-1222-8333-444455556666"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_overwrites() {
        let registry = registry();
        registry.register(Arc::new(NullProvider { name: "null" }));
        registry.register(Arc::new(NullProvider { name: "null" }));
        assert_eq!(registry.platform_names().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_non_uuid_token() {
        let registry = registry();
        registry.register(Arc::new(NullProvider { name: "null" }));

        let err = registry
            .dispatch_webhook("null", "not-a-uuid", serde_json::json!({}), HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_token() {
        let registry = registry();
        registry.register(Arc::new(NullProvider { name: "null" }));

        let err = registry
            .dispatch_webhook(
                "null",
                "3f6f0b2e-1111-4222-8333-444455556666",
                serde_json::json!({}),
                HashMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_inactive_config() {
        let store = Arc::new(MemoryStore::new());
        let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
        let sealed = cipher.encrypt(&serde_json::json!({"token": "t"})).unwrap();

        let now = Utc::now();
        let config = PlatformConfig {
            id: "cfg-1".into(),
            project_id: "proj-1".into(),
            platform: "null".into(),
            credentials_encrypted: sealed,
            webhook_token: "3f6f0b2e-1111-4222-8333-444455556666".into(),
            is_active: false,
            test_mode: false,
            created_at: now,
            updated_at: now,
        };
        use gatekit_store::PlatformConfigStore as _;
        store.insert_platform(config).await.unwrap();

        let registry = PlatformRegistry::new(store, cipher);
        registry.register(Arc::new(NullProvider { name: "null" }));

        let err = registry
            .dispatch_webhook(
                "null",
                "3f6f0b2e-1111-4222-8333-444455556666",
                serde_json::json!({}),
                HashMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_health_is_idle_friendly() {
        let registry = registry();
        registry.register(Arc::new(NullProvider { name: "null" }));

        let health = registry.health().await;
        assert!(health.healthy);
        assert_eq!(health.providers.len(), 1);
        assert_eq!(health.providers[0].connections, 0);
    }
}
