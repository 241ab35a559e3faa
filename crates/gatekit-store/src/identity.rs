//! Cross-platform identity resolution
//!
//! Maps `(platform_config_id, provider_user_id)` tuples onto unified
//! identities. Automatic resolution happens on every inbound message;
//! concurrent resolvers for the same tuple converge on one identity through
//! the alias uniqueness constraint rather than locking.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use gatekit_core::{GatewayError, GatewayResult, Identity, IdentityAlias, LinkMethod};

use crate::error::StoreError;
use crate::traits::IdentityStore;

/// Resolves and links identities on top of the identity store
pub struct IdentityResolver<S: IdentityStore + ?Sized> {
    store: Arc<S>,
}

impl<S: IdentityStore + ?Sized> Clone for IdentityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: IdentityStore + ?Sized> IdentityResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a platform user tuple to an identity id, creating identity
    /// and alias when the tuple is unseen.
    ///
    /// Lost races are absorbed: if another resolver links the tuple first,
    /// the freshly created identity is discarded and the winner's identity
    /// is returned.
    pub async fn resolve(
        &self,
        project_id: &str,
        platform_config_id: &str,
        platform: &str,
        provider_user_id: &str,
        display: Option<&str>,
    ) -> GatewayResult<String> {
        if let Some(alias) = self
            .store
            .alias_by_tuple(platform_config_id, provider_user_id)
            .await?
        {
            return Ok(alias.identity_id);
        }

        let now = Utc::now();
        let identity = self
            .store
            .insert_identity(Identity {
                id: Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                display_name: display.map(str::to_string),
                email: None,
                metadata: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let alias = IdentityAlias {
            id: Uuid::new_v4().to_string(),
            identity_id: identity.id.clone(),
            project_id: project_id.to_string(),
            platform_config_id: platform_config_id.to_string(),
            platform: platform.to_string(),
            provider_user_id: provider_user_id.to_string(),
            provider_user_display: display.map(str::to_string),
            link_method: LinkMethod::Automatic,
            linked_at: now,
        };

        match self.store.insert_alias(alias).await {
            Ok(_) => Ok(identity.id),
            Err(StoreError::Duplicate { .. }) => {
                // Another resolver won the race; drop our identity and
                // return the winner's.
                debug!(
                    platform_config_id,
                    provider_user_id, "identity resolution race lost, converging"
                );
                let _ = self.store.delete_identity(&identity.id).await;
                let winner = self
                    .store
                    .alias_by_tuple(platform_config_id, provider_user_id)
                    .await?
                    .ok_or_else(|| {
                        GatewayError::Internal("alias vanished after duplicate insert".into())
                    })?;
                Ok(winner.identity_id)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Manually link a platform user tuple to an existing identity
    pub async fn add_alias(
        &self,
        identity_id: &str,
        project_id: &str,
        platform_config_id: &str,
        platform: &str,
        provider_user_id: &str,
        display: Option<&str>,
    ) -> GatewayResult<IdentityAlias> {
        if self.store.identity_by_id(identity_id).await?.is_none() {
            return Err(GatewayError::NotFound("identity".into()));
        }
        let alias = IdentityAlias {
            id: Uuid::new_v4().to_string(),
            identity_id: identity_id.to_string(),
            project_id: project_id.to_string(),
            platform_config_id: platform_config_id.to_string(),
            platform: platform.to_string(),
            provider_user_id: provider_user_id.to_string(),
            provider_user_display: display.map(str::to_string),
            link_method: LinkMethod::Manual,
            linked_at: Utc::now(),
        };
        Ok(self.store.insert_alias(alias).await?)
    }

    /// Unlink an alias. The identity stays, possibly orphaned.
    pub async fn remove_alias(&self, alias_id: &str) -> GatewayResult<()> {
        Ok(self.store.remove_alias(alias_id).await?)
    }

    /// Delete an identity, cascading its aliases
    pub async fn delete_identity(&self, identity_id: &str) -> GatewayResult<()> {
        Ok(self.store.delete_identity(identity_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn resolver() -> (Arc<MemoryStore>, IdentityResolver<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), IdentityResolver::new(store))
    }

    #[tokio::test]
    async fn test_resolve_creates_then_reuses() {
        let (_, resolver) = resolver();

        let first = resolver
            .resolve("proj-1", "cfg-1", "telegram", "7", Some("alice"))
            .await
            .unwrap();
        let second = resolver
            .resolve("proj-1", "cfg-1", "telegram", "7", Some("alice"))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_different_tuples_get_different_identities() {
        let (_, resolver) = resolver();

        let a = resolver
            .resolve("proj-1", "cfg-1", "telegram", "7", None)
            .await
            .unwrap();
        let b = resolver
            .resolve("proj-1", "cfg-2", "discord", "7", None)
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_converges() {
        let (_, resolver) = resolver();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve("proj-1", "cfg-1", "telegram", "7", Some("alice"))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all resolvers must converge to one identity");
    }

    #[tokio::test]
    async fn test_removing_last_alias_keeps_identity() {
        let (store, resolver) = resolver();

        let identity_id = resolver
            .resolve("proj-1", "cfg-1", "telegram", "7", None)
            .await
            .unwrap();
        let aliases = store.list_aliases(&identity_id).await.unwrap();
        assert_eq!(aliases.len(), 1);

        resolver.remove_alias(&aliases[0].id).await.unwrap();
        assert!(store.identity_by_id(&identity_id).await.unwrap().is_some());
        assert!(store.list_aliases(&identity_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_identity_cascades_aliases() {
        let (store, resolver) = resolver();

        let identity_id = resolver
            .resolve("proj-1", "cfg-1", "telegram", "7", None)
            .await
            .unwrap();
        resolver
            .add_alias(&identity_id, "proj-1", "cfg-2", "discord", "d-7", None)
            .await
            .unwrap();

        resolver.delete_identity(&identity_id).await.unwrap();
        assert!(store.identity_by_id(&identity_id).await.unwrap().is_none());
        assert!(store
            .alias_by_tuple("cfg-1", "7")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .alias_by_tuple("cfg-2", "d-7")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_alias_to_missing_identity_fails() {
        let (_, resolver) = resolver();
        let result = resolver
            .add_alias("ghost", "proj-1", "cfg-1", "telegram", "7", None)
            .await;
        assert!(result.is_err());
    }
}
