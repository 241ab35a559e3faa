//! API-key service: create, list, revoke, roll
//!
//! The plaintext token leaves this module exactly once per mint (create or
//! roll). Afterwards only the masked `prefix…suffix` form is observable.
//! A roll keeps the old key alive for a 24-hour grace window so callers can
//! swap credentials without an outage.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use gatekit_core::{ApiKey, GatewayError, GatewayResult, Project, ScopeSet};
use gatekit_crypto::generate_api_key;
use gatekit_store::{ApiKeyStore, Store};

/// Dual-live window after a roll
pub const ROLL_GRACE_HOURS: i64 = 24;

/// A freshly minted key: the stored record plus the one-time plaintext
#[derive(Debug, Clone)]
pub struct MintedKey {
    pub record: ApiKey,
    pub plaintext: String,
}

/// Key management on top of the store
#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn Store>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Mint a key for a project. Scopes must come from the closed
    /// vocabulary; the `env` segment follows the project's environment.
    pub async fn create(
        &self,
        project: &Project,
        name: &str,
        scopes: Vec<String>,
        expires_in_days: Option<i64>,
        created_by: Option<String>,
    ) -> GatewayResult<MintedKey> {
        if name.trim().is_empty() {
            return Err(GatewayError::validation("name", "must not be empty"));
        }
        if scopes.is_empty() {
            return Err(GatewayError::validation("scopes", "must not be empty"));
        }
        let scope_set = ScopeSet::parse_all(scopes.iter().map(String::as_str))?;
        if let Some(days) = expires_in_days {
            if days < 1 {
                return Err(GatewayError::validation(
                    "expiresInDays",
                    "must be at least 1",
                ));
            }
        }

        let generated = generate_api_key(project.environment);
        let now = Utc::now();
        let record = self
            .store
            .insert_key(ApiKey {
                id: Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                key_hash: generated.hash,
                key_prefix: generated.prefix,
                key_suffix: generated.suffix,
                name: name.to_string(),
                scopes: scope_set.to_strings(),
                created_at: now,
                expires_at: expires_in_days.map(|days| now + Duration::days(days)),
                revoked_at: None,
                last_used_at: None,
                created_by,
            })
            .await?;

        info!(project = %project.slug, key = %record.id, "api key created");
        Ok(MintedKey {
            record,
            plaintext: generated.token,
        })
    }

    /// Active keys of a project, masked. Revoked keys are filtered out;
    /// keys in a roll grace window still count as active.
    pub async fn list(&self, project_id: &str) -> GatewayResult<Vec<ApiKey>> {
        let now = Utc::now();
        Ok(self
            .store
            .list_keys(project_id)
            .await?
            .into_iter()
            .filter(|key| match key.revoked_at {
                None => true,
                Some(at) => at > now,
            })
            .collect())
    }

    /// Key lookup scoped to a project; cross-project ids read as missing
    async fn owned_key(&self, project_id: &str, key_id: &str) -> GatewayResult<ApiKey> {
        let key = self
            .store
            .key_by_id(key_id)
            .await?
            .filter(|key| key.project_id == project_id)
            .ok_or_else(|| GatewayError::NotFound("api key".into()))?;
        Ok(key)
    }

    /// Revoke immediately. Revoking an already-revoked key succeeds and
    /// leaves the original revocation instant untouched.
    pub async fn revoke(&self, project_id: &str, key_id: &str) -> GatewayResult<ApiKey> {
        let key = self.owned_key(project_id, key_id).await?;
        let revoked = self.store.revoke_key(&key.id, Utc::now()).await?;
        info!(key = %key.id, "api key revoked");
        Ok(revoked)
    }

    /// Roll: atomically schedule the old key's revocation 24h out and mint
    /// a replacement with the same name and scopes.
    pub async fn roll(&self, project: &Project, key_id: &str) -> GatewayResult<MintedKey> {
        let old = self.owned_key(&project.id, key_id).await?;
        if !old.is_valid_at(Utc::now()) {
            return Err(GatewayError::Conflict("key is already revoked".into()));
        }

        let generated = generate_api_key(project.environment);
        let now = Utc::now();
        let replacement = ApiKey {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            key_hash: generated.hash,
            key_prefix: generated.prefix,
            key_suffix: generated.suffix,
            name: old.name.clone(),
            scopes: old.scopes.clone(),
            created_at: now,
            expires_at: old.expires_at,
            revoked_at: None,
            last_used_at: None,
            created_by: old.created_by.clone(),
        };

        let record = self
            .store
            .roll_key(
                &old.id,
                now + Duration::hours(ROLL_GRACE_HOURS),
                replacement,
            )
            .await?;

        info!(old = %old.id, new = %record.id, "api key rolled");
        Ok(MintedKey {
            record,
            plaintext: generated.token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekit_core::Environment;
    use gatekit_crypto::hash_api_key;
    use gatekit_store::{ApiKeyStore, MemoryStore};

    fn test_project() -> Project {
        let now = Utc::now();
        Project {
            id: "proj-1".into(),
            slug: "demo".into(),
            name: "Demo".into(),
            environment: Environment::Development,
            owner_id: "user-1".into(),
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn service() -> (Arc<MemoryStore>, ApiKeyService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ApiKeyService::new(store))
    }

    #[tokio::test]
    async fn test_create_returns_plaintext_once() {
        let (store, service) = service();
        let minted = service
            .create(
                &test_project(),
                "bot",
                vec!["messages:send".into(), "messages:read".into()],
                None,
                None,
            )
            .await
            .unwrap();

        assert!(minted.plaintext.starts_with("gk_dev_"));
        assert_eq!(minted.record.key_prefix.len(), 8);
        assert_eq!(minted.record.key_hash, hash_api_key(&minted.plaintext));

        // The stored record has no plaintext anywhere
        let stored = store.key_by_id(&minted.record.id).await.unwrap().unwrap();
        assert_eq!(stored.key_hash, minted.record.key_hash);
        assert!(!stored.key_hash.contains(&minted.plaintext));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_scope() {
        let (_, service) = service();
        let result = service
            .create(&test_project(), "bot", vec!["messages:admin".into()], None, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_hides_revoked_keeps_rolling() {
        let (_, service) = service();
        let project = test_project();
        let a = service
            .create(&project, "a", vec!["messages:read".into()], None, None)
            .await
            .unwrap();
        let b = service
            .create(&project, "b", vec!["messages:read".into()], None, None)
            .await
            .unwrap();

        service.revoke(&project.id, &a.record.id).await.unwrap();
        // b is rolled: the old b enters the grace window, still listed
        service.roll(&project, &b.record.id).await.unwrap();

        let listed = service.list(&project.id).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|k| k.id.as_str()).collect();
        assert!(!ids.contains(&a.record.id.as_str()));
        assert!(ids.contains(&b.record.id.as_str()));
        assert_eq!(listed.len(), 2); // old b + new b
    }

    #[tokio::test]
    async fn test_roll_preserves_name_and_scopes() {
        let (store, service) = service();
        let project = test_project();
        let original = service
            .create(
                &project,
                "bot",
                vec!["messages:send".into()],
                Some(30),
                Some("user-1".into()),
            )
            .await
            .unwrap();

        let rolled = service.roll(&project, &original.record.id).await.unwrap();
        assert_eq!(rolled.record.name, "bot");
        assert_eq!(rolled.record.scopes, original.record.scopes);
        assert_ne!(rolled.plaintext, original.plaintext);

        // The old key's revocation sits ~24h in the future
        let old = store.key_by_id(&original.record.id).await.unwrap().unwrap();
        let revoke_at = old.revoked_at.unwrap();
        let delta = revoke_at - Utc::now();
        assert!(delta > Duration::hours(23) && delta <= Duration::hours(24));
    }

    #[tokio::test]
    async fn test_roll_of_revoked_key_conflicts() {
        let (_, service) = service();
        let project = test_project();
        let key = service
            .create(&project, "bot", vec!["messages:send".into()], None, None)
            .await
            .unwrap();
        service.revoke(&project.id, &key.record.id).await.unwrap();

        let result = service.roll(&project, &key.record.id).await;
        assert!(matches!(result, Err(GatewayError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cross_project_key_reads_as_missing() {
        let (_, service) = service();
        let key = service
            .create(&test_project(), "bot", vec!["messages:send".into()], None, None)
            .await
            .unwrap();

        let result = service.revoke("other-project", &key.record.id).await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }
}
