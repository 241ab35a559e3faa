//! Lock-free in-memory backend
//!
//! DashMap-backed implementation of every repository trait. Secondary index
//! maps enforce the uniqueness constraints; the index entry is always
//! claimed before the primary row is written, so concurrent writers race on
//! the index and exactly one wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use gatekit_core::{
    ApiKey, Identity, IdentityAlias, LogLevel, Pagination, PlatformConfig, PlatformLog,
    PlatformLogSink, Project, ProjectMember, ReactionKind, ReceivedMessage, ReceivedReaction,
    SentMessage, SentStatus, Webhook, WebhookDelivery,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    ApiKeyStore, IdentityStore, MessageStore, PlatformConfigStore, PlatformLogStore,
    ProjectStore, ReactionStore, WebhookStore,
};
use crate::types::{
    DeliveryFilter, LogFilter, LogStats, LogVolume, MessageStats, ReactionGroup, ReactionUser,
    ReceivedMessageFilter,
};

/// In-memory store. Cheap to clone behind an `Arc`; all tables are
/// concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    projects: DashMap<String, Project>,
    slug_index: DashMap<String, String>,
    members: DashMap<String, ProjectMember>,

    api_keys: DashMap<String, ApiKey>,
    key_hash_index: DashMap<String, String>,
    /// Serializes the multi-statement roll transaction
    roll_lock: Mutex<()>,

    platforms: DashMap<String, PlatformConfig>,
    webhook_token_index: DashMap<String, String>,

    received: DashMap<String, ReceivedMessage>,
    received_index: DashMap<(String, String), String>,
    reactions: DashMap<String, ReceivedReaction>,
    sent: DashMap<String, SentMessage>,

    identities: DashMap<String, Identity>,
    aliases: DashMap<String, IdentityAlias>,
    alias_index: DashMap<(String, String), String>,

    webhooks: DashMap<String, Webhook>,
    deliveries: DashMap<String, WebhookDelivery>,

    logs: RwLock<Vec<PlatformLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: Project) -> StoreResult<Project> {
        match self.slug_index.entry(project.slug.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate { constraint: "project.slug" });
            }
            Entry::Vacant(slot) => {
                slot.insert(project.id.clone());
            }
        }
        self.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn project_by_id(&self, id: &str) -> StoreResult<Option<Project>> {
        Ok(self.projects.get(id).map(|p| p.clone()))
    }

    async fn project_by_slug(&self, slug: &str) -> StoreResult<Option<Project>> {
        let Some(id) = self.slug_index.get(slug).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.project_by_id(&id).await
    }

    async fn list_projects(&self, owner_id: Option<&str>) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| owner_id.is_none_or(|owner| p.owner_id == owner))
            .map(|p| p.clone())
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn update_project(&self, project: Project) -> StoreResult<Project> {
        let Some(existing) = self.projects.get(&project.id).map(|p| p.clone()) else {
            return Err(StoreError::not_found("project"));
        };
        if existing.slug != project.slug {
            match self.slug_index.entry(project.slug.clone()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::Duplicate { constraint: "project.slug" });
                }
                Entry::Vacant(slot) => {
                    slot.insert(project.id.clone());
                }
            }
            self.slug_index.remove(&existing.slug);
        }
        self.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn delete_project(&self, id: &str) -> StoreResult<()> {
        let Some((_, project)) = self.projects.remove(id) else {
            return Err(StoreError::not_found("project"));
        };
        self.slug_index.remove(&project.slug);

        self.members.retain(|_, m| m.project_id != id);

        let key_ids: Vec<String> = self
            .api_keys
            .iter()
            .filter(|k| k.project_id == id)
            .map(|k| k.id.clone())
            .collect();
        for key_id in key_ids {
            if let Some((_, key)) = self.api_keys.remove(&key_id) {
                self.key_hash_index.remove(&key.key_hash);
            }
        }

        let platform_ids: Vec<String> = self
            .platforms
            .iter()
            .filter(|p| p.project_id == id)
            .map(|p| p.id.clone())
            .collect();
        for platform_id in platform_ids {
            if let Some((_, config)) = self.platforms.remove(&platform_id) {
                self.webhook_token_index.remove(&config.webhook_token);
            }
        }

        self.received.retain(|_, m| m.project_id != id);
        self.received_index
            .retain(|_, row_id| self.received.contains_key(row_id));
        self.reactions.retain(|_, r| r.project_id != id);
        self.sent.retain(|_, m| m.project_id != id);

        self.aliases.retain(|_, a| a.project_id != id);
        self.alias_index
            .retain(|_, alias_id| self.aliases.contains_key(alias_id));
        self.identities.retain(|_, i| i.project_id != id);

        let webhook_ids: Vec<String> = self
            .webhooks
            .iter()
            .filter(|w| w.project_id == id)
            .map(|w| w.id.clone())
            .collect();
        for webhook_id in &webhook_ids {
            self.webhooks.remove(webhook_id);
        }
        self.deliveries
            .retain(|_, d| !webhook_ids.contains(&d.webhook_id));

        self.logs.write().retain(|entry| entry.project_id != id);
        Ok(())
    }

    async fn add_member(&self, member: ProjectMember) -> StoreResult<ProjectMember> {
        let exists = self
            .members
            .iter()
            .any(|m| m.project_id == member.project_id && m.user_id == member.user_id);
        if exists {
            return Err(StoreError::Duplicate {
                constraint: "project_member(project_id, user_id)",
            });
        }
        self.members.insert(member.id.clone(), member.clone());
        Ok(member)
    }

    async fn list_members(&self, project_id: &str) -> StoreResult<Vec<ProjectMember>> {
        let mut members: Vec<ProjectMember> = self
            .members
            .iter()
            .filter(|m| m.project_id == project_id)
            .map(|m| m.clone())
            .collect();
        members.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(members)
    }

    async fn member(&self, project_id: &str, user_id: &str) -> StoreResult<Option<ProjectMember>> {
        Ok(self
            .members
            .iter()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .map(|m| m.clone()))
    }

    async fn remove_member(&self, project_id: &str, user_id: &str) -> StoreResult<()> {
        let id = self
            .members
            .iter()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .map(|m| m.id.clone());
        match id {
            Some(id) => {
                self.members.remove(&id);
                Ok(())
            }
            None => Err(StoreError::not_found("member")),
        }
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert_key(&self, key: ApiKey) -> StoreResult<ApiKey> {
        match self.key_hash_index.entry(key.key_hash.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate { constraint: "api_key.key_hash" });
            }
            Entry::Vacant(slot) => {
                slot.insert(key.id.clone());
            }
        }
        self.api_keys.insert(key.id.clone(), key.clone());
        Ok(key)
    }

    async fn key_by_id(&self, id: &str) -> StoreResult<Option<ApiKey>> {
        Ok(self.api_keys.get(id).map(|k| k.clone()))
    }

    async fn key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let Some(id) = self.key_hash_index.get(key_hash).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.key_by_id(&id).await
    }

    async fn list_keys(&self, project_id: &str) -> StoreResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self
            .api_keys
            .iter()
            .filter(|k| k.project_id == project_id)
            .map(|k| k.clone())
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn revoke_key(&self, id: &str, at: DateTime<Utc>) -> StoreResult<ApiKey> {
        let Some(mut key) = self.api_keys.get_mut(id) else {
            return Err(StoreError::not_found("api key"));
        };
        match key.revoked_at {
            // Already effectively revoked: idempotent, leave untouched
            Some(existing) if existing <= at => {}
            // Inside a roll grace window: tighten to the earlier instant
            Some(_) | None => key.revoked_at = Some(at),
        }
        Ok(key.clone())
    }

    async fn touch_key(&self, id: &str, at: DateTime<Utc>) {
        if let Some(mut key) = self.api_keys.get_mut(id) {
            key.last_used_at = Some(at);
        }
    }

    async fn roll_key(
        &self,
        old_id: &str,
        revoke_old_at: DateTime<Utc>,
        replacement: ApiKey,
    ) -> StoreResult<ApiKey> {
        let _guard = self.roll_lock.lock();

        if !self.api_keys.contains_key(old_id) {
            return Err(StoreError::not_found("api key"));
        }
        match self.key_hash_index.entry(replacement.key_hash.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate { constraint: "api_key.key_hash" });
            }
            Entry::Vacant(slot) => {
                slot.insert(replacement.id.clone());
            }
        }
        if let Some(mut old) = self.api_keys.get_mut(old_id) {
            old.revoked_at = Some(revoke_old_at);
        }
        self.api_keys
            .insert(replacement.id.clone(), replacement.clone());
        Ok(replacement)
    }
}

#[async_trait]
impl PlatformConfigStore for MemoryStore {
    async fn insert_platform(&self, config: PlatformConfig) -> StoreResult<PlatformConfig> {
        match self.webhook_token_index.entry(config.webhook_token.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate {
                    constraint: "platform_config.webhook_token",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(config.id.clone());
            }
        }
        self.platforms.insert(config.id.clone(), config.clone());
        Ok(config)
    }

    async fn platform_by_id(&self, id: &str) -> StoreResult<Option<PlatformConfig>> {
        Ok(self.platforms.get(id).map(|p| p.clone()))
    }

    async fn platform_by_webhook_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<PlatformConfig>> {
        let Some(id) = self.webhook_token_index.get(token).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.platform_by_id(&id).await
    }

    async fn list_platforms(&self, project_id: &str) -> StoreResult<Vec<PlatformConfig>> {
        let mut configs: Vec<PlatformConfig> = self
            .platforms
            .iter()
            .filter(|p| p.project_id == project_id)
            .map(|p| p.clone())
            .collect();
        configs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(configs)
    }

    async fn list_active_platforms(&self) -> StoreResult<Vec<PlatformConfig>> {
        Ok(self
            .platforms
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.clone())
            .collect())
    }

    async fn update_platform(&self, config: PlatformConfig) -> StoreResult<PlatformConfig> {
        if !self.platforms.contains_key(&config.id) {
            return Err(StoreError::not_found("platform config"));
        }
        self.platforms.insert(config.id.clone(), config.clone());
        Ok(config)
    }

    async fn delete_platform(&self, id: &str) -> StoreResult<()> {
        match self.platforms.remove(id) {
            Some((_, config)) => {
                self.webhook_token_index.remove(&config.webhook_token);
                Ok(())
            }
            None => Err(StoreError::not_found("platform config")),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_received(&self, message: ReceivedMessage) -> StoreResult<ReceivedMessage> {
        let unique = (
            message.platform_config_id.clone(),
            message.provider_message_id.clone(),
        );
        match self.received_index.entry(unique) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate {
                    constraint: "received_message(platform_config_id, provider_message_id)",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(message.id.clone());
            }
        }
        self.received.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn received_by_id(&self, id: &str) -> StoreResult<Option<ReceivedMessage>> {
        Ok(self.received.get(id).map(|m| m.clone()))
    }

    async fn list_received(
        &self,
        project_id: &str,
        filter: &ReceivedMessageFilter,
        page: Pagination,
    ) -> StoreResult<Vec<ReceivedMessage>> {
        let mut messages: Vec<ReceivedMessage> = self
            .received
            .iter()
            .filter(|m| m.project_id == project_id)
            .filter(|m| {
                filter
                    .platform_config_id
                    .as_deref()
                    .is_none_or(|v| m.platform_config_id == v)
            })
            .filter(|m| {
                filter
                    .provider_chat_id
                    .as_deref()
                    .is_none_or(|v| m.provider_chat_id == v)
            })
            .filter(|m| {
                filter
                    .provider_user_id
                    .as_deref()
                    .is_none_or(|v| m.provider_user_id == v)
            })
            .map(|m| m.clone())
            .collect();
        messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(page.slice(&messages).to_vec())
    }

    async fn delete_received_before(
        &self,
        project_id: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let doomed: Vec<(String, String, String)> = self
            .received
            .iter()
            .filter(|m| m.project_id == project_id && m.received_at < before)
            .map(|m| {
                (
                    m.id.clone(),
                    m.platform_config_id.clone(),
                    m.provider_message_id.clone(),
                )
            })
            .collect();
        for (id, config_id, provider_message_id) in &doomed {
            self.received.remove(id);
            self.received_index
                .remove(&(config_id.clone(), provider_message_id.clone()));
        }
        Ok(doomed.len() as u64)
    }

    async fn insert_sent(&self, message: SentMessage) -> StoreResult<SentMessage> {
        self.sent.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn sent_by_id(&self, id: &str) -> StoreResult<Option<SentMessage>> {
        Ok(self.sent.get(id).map(|m| m.clone()))
    }

    async fn list_sent(&self, project_id: &str, page: Pagination) -> StoreResult<Vec<SentMessage>> {
        let mut messages: Vec<SentMessage> = self
            .sent
            .iter()
            .filter(|m| m.project_id == project_id)
            .map(|m| m.clone())
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.slice(&messages).to_vec())
    }

    async fn sent_by_job(&self, job_id: &str) -> StoreResult<Vec<SentMessage>> {
        let mut messages: Vec<SentMessage> = self
            .sent
            .iter()
            .filter(|m| m.job_id == job_id)
            .map(|m| m.clone())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn update_sent_status(
        &self,
        id: &str,
        status: SentStatus,
        provider_message_id: Option<String>,
        error_message: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<SentMessage> {
        let Some(mut message) = self.sent.get_mut(id) else {
            return Err(StoreError::not_found("sent message"));
        };
        if message.status != SentStatus::Pending || status == SentStatus::Pending {
            return Err(StoreError::InvalidTransition(format!(
                "sent message {} cannot move {:?} -> {:?}",
                id, message.status, status
            )));
        }
        message.status = status;
        message.provider_message_id = provider_message_id;
        message.error_message = error_message;
        message.sent_at = sent_at;
        Ok(message.clone())
    }

    async fn message_stats(&self, project_id: &str) -> StoreResult<MessageStats> {
        let mut stats = MessageStats {
            received_count: self
                .received
                .iter()
                .filter(|m| m.project_id == project_id)
                .count() as u64,
            reaction_count: self
                .reactions
                .iter()
                .filter(|r| r.project_id == project_id)
                .count() as u64,
            ..Default::default()
        };
        for message in self.sent.iter().filter(|m| m.project_id == project_id) {
            match message.status {
                SentStatus::Sent => stats.sent_count += 1,
                SentStatus::Pending => stats.pending_count += 1,
                SentStatus::Failed => stats.failed_count += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl ReactionStore for MemoryStore {
    async fn insert_reaction(&self, reaction: ReceivedReaction) -> StoreResult<ReceivedReaction> {
        self.reactions.insert(reaction.id.clone(), reaction.clone());
        Ok(reaction)
    }

    async fn list_reactions(
        &self,
        project_id: &str,
        provider_message_id: Option<&str>,
        page: Pagination,
    ) -> StoreResult<Vec<ReceivedReaction>> {
        let mut reactions: Vec<ReceivedReaction> = self
            .reactions
            .iter()
            .filter(|r| r.project_id == project_id)
            .filter(|r| provider_message_id.is_none_or(|id| r.provider_message_id == id))
            .map(|r| r.clone())
            .collect();
        reactions.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(page.slice(&reactions).to_vec())
    }

    async fn current_reactions(
        &self,
        platform_config_id: &str,
        provider_message_id: &str,
    ) -> StoreResult<Vec<ReactionGroup>> {
        // Latest event per (user, emoji) wins; visible iff it is `added`.
        use std::collections::HashMap;
        let mut latest: HashMap<(String, String), ReceivedReaction> = HashMap::new();
        for reaction in self.reactions.iter().filter(|r| {
            r.platform_config_id == platform_config_id
                && r.provider_message_id == provider_message_id
        }) {
            let tuple = (reaction.provider_user_id.clone(), reaction.emoji.clone());
            match latest.get(&tuple) {
                Some(existing) if existing.received_at >= reaction.received_at => {}
                _ => {
                    latest.insert(tuple, reaction.clone());
                }
            }
        }

        let mut groups: HashMap<String, Vec<ReactionUser>> = HashMap::new();
        for ((user_id, emoji), event) in latest {
            if event.reaction_kind == ReactionKind::Added {
                groups.entry(emoji).or_default().push(ReactionUser {
                    provider_user_id: user_id,
                    user_display: event.user_display,
                });
            }
        }

        let mut result: Vec<ReactionGroup> = groups
            .into_iter()
            .map(|(emoji, mut users)| {
                users.sort_by(|a, b| a.provider_user_id.cmp(&b.provider_user_id));
                ReactionGroup { emoji, users }
            })
            .collect();
        result.sort_by(|a, b| a.emoji.cmp(&b.emoji));
        Ok(result)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn insert_identity(&self, identity: Identity) -> StoreResult<Identity> {
        self.identities
            .insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn identity_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        Ok(self.identities.get(id).map(|i| i.clone()))
    }

    async fn list_identities(
        &self,
        project_id: &str,
        page: Pagination,
    ) -> StoreResult<Vec<Identity>> {
        let mut identities: Vec<Identity> = self
            .identities
            .iter()
            .filter(|i| i.project_id == project_id)
            .map(|i| i.clone())
            .collect();
        identities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.slice(&identities).to_vec())
    }

    async fn update_identity(&self, identity: Identity) -> StoreResult<Identity> {
        if !self.identities.contains_key(&identity.id) {
            return Err(StoreError::not_found("identity"));
        }
        self.identities
            .insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn delete_identity(&self, id: &str) -> StoreResult<()> {
        if self.identities.remove(id).is_none() {
            return Err(StoreError::not_found("identity"));
        }
        let doomed: Vec<(String, String, String)> = self
            .aliases
            .iter()
            .filter(|a| a.identity_id == id)
            .map(|a| {
                (
                    a.id.clone(),
                    a.platform_config_id.clone(),
                    a.provider_user_id.clone(),
                )
            })
            .collect();
        for (alias_id, config_id, provider_user_id) in doomed {
            self.aliases.remove(&alias_id);
            self.alias_index.remove(&(config_id, provider_user_id));
        }
        Ok(())
    }

    async fn insert_alias(&self, alias: IdentityAlias) -> StoreResult<IdentityAlias> {
        let tuple = (
            alias.platform_config_id.clone(),
            alias.provider_user_id.clone(),
        );
        match self.alias_index.entry(tuple) {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate {
                    constraint: "identity_alias(platform_config_id, provider_user_id)",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(alias.id.clone());
            }
        }
        self.aliases.insert(alias.id.clone(), alias.clone());
        Ok(alias)
    }

    async fn alias_by_tuple(
        &self,
        platform_config_id: &str,
        provider_user_id: &str,
    ) -> StoreResult<Option<IdentityAlias>> {
        let tuple = (platform_config_id.to_string(), provider_user_id.to_string());
        let Some(id) = self.alias_index.get(&tuple).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.aliases.get(&id).map(|a| a.clone()))
    }

    async fn list_aliases(&self, identity_id: &str) -> StoreResult<Vec<IdentityAlias>> {
        let mut aliases: Vec<IdentityAlias> = self
            .aliases
            .iter()
            .filter(|a| a.identity_id == identity_id)
            .map(|a| a.clone())
            .collect();
        aliases.sort_by(|a, b| b.linked_at.cmp(&a.linked_at));
        Ok(aliases)
    }

    async fn remove_alias(&self, alias_id: &str) -> StoreResult<()> {
        match self.aliases.remove(alias_id) {
            Some((_, alias)) => {
                self.alias_index
                    .remove(&(alias.platform_config_id, alias.provider_user_id));
                Ok(())
            }
            None => Err(StoreError::not_found("alias")),
        }
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn insert_webhook(&self, webhook: Webhook) -> StoreResult<Webhook> {
        self.webhooks.insert(webhook.id.clone(), webhook.clone());
        Ok(webhook)
    }

    async fn webhook_by_id(&self, id: &str) -> StoreResult<Option<Webhook>> {
        Ok(self.webhooks.get(id).map(|w| w.clone()))
    }

    async fn list_webhooks(&self, project_id: &str) -> StoreResult<Vec<Webhook>> {
        let mut webhooks: Vec<Webhook> = self
            .webhooks
            .iter()
            .filter(|w| w.project_id == project_id)
            .map(|w| w.clone())
            .collect();
        webhooks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(webhooks)
    }

    async fn update_webhook(&self, webhook: Webhook) -> StoreResult<Webhook> {
        if !self.webhooks.contains_key(&webhook.id) {
            return Err(StoreError::not_found("webhook"));
        }
        self.webhooks.insert(webhook.id.clone(), webhook.clone());
        Ok(webhook)
    }

    async fn delete_webhook(&self, id: &str) -> StoreResult<()> {
        if self.webhooks.remove(id).is_none() {
            return Err(StoreError::not_found("webhook"));
        }
        self.deliveries.retain(|_, d| d.webhook_id != id);
        Ok(())
    }

    async fn insert_delivery(&self, delivery: WebhookDelivery) -> StoreResult<WebhookDelivery> {
        self.deliveries.insert(delivery.id.clone(), delivery.clone());
        Ok(delivery)
    }

    async fn delivery_by_id(&self, id: &str) -> StoreResult<Option<WebhookDelivery>> {
        Ok(self.deliveries.get(id).map(|d| d.clone()))
    }

    async fn update_delivery(&self, delivery: WebhookDelivery) -> StoreResult<WebhookDelivery> {
        if !self.deliveries.contains_key(&delivery.id) {
            return Err(StoreError::not_found("webhook delivery"));
        }
        self.deliveries.insert(delivery.id.clone(), delivery.clone());
        Ok(delivery)
    }

    async fn list_deliveries(
        &self,
        webhook_id: &str,
        filter: &DeliveryFilter,
        page: Pagination,
    ) -> StoreResult<Vec<WebhookDelivery>> {
        let mut deliveries: Vec<WebhookDelivery> = self
            .deliveries
            .iter()
            .filter(|d| d.webhook_id == webhook_id)
            .filter(|d| filter.event.as_deref().is_none_or(|e| d.event == e))
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .map(|d| d.clone())
            .collect();
        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.slice(&deliveries).to_vec())
    }
}

#[async_trait]
impl PlatformLogStore for MemoryStore {
    async fn append_log(&self, entry: PlatformLog) -> StoreResult<()> {
        self.logs.write().push(entry);
        Ok(())
    }

    async fn query_logs(
        &self,
        project_id: &str,
        filter: &LogFilter,
        page: Pagination,
    ) -> StoreResult<Vec<PlatformLog>> {
        let logs = self.logs.read();
        let mut matched: Vec<PlatformLog> = logs
            .iter()
            .filter(|l| l.project_id == project_id)
            .filter(|l| filter.platform.as_deref().is_none_or(|p| l.platform == p))
            .filter(|l| {
                filter
                    .platform_config_id
                    .as_deref()
                    .is_none_or(|c| l.platform_config_id.as_deref() == Some(c))
            })
            .filter(|l| filter.level.is_none_or(|lvl| l.level == lvl))
            .filter(|l| filter.category.is_none_or(|cat| l.category == cat))
            .filter(|l| filter.start.is_none_or(|s| l.timestamp >= s))
            .filter(|l| filter.end.is_none_or(|e| l.timestamp <= e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(page.slice(&matched).to_vec())
    }

    async fn log_stats(&self, project_id: &str, recent: usize) -> StoreResult<LogStats> {
        use std::collections::HashMap;
        let logs = self.logs.read();

        let mut counts: HashMap<(LogLevel, gatekit_core::LogCategory), u64> = HashMap::new();
        let mut errors: Vec<PlatformLog> = Vec::new();
        for entry in logs.iter().filter(|l| l.project_id == project_id) {
            *counts.entry((entry.level, entry.category)).or_default() += 1;
            if entry.level == LogLevel::Error {
                errors.push(entry.clone());
            }
        }
        errors.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        errors.truncate(recent);

        let mut volumes: Vec<LogVolume> = counts
            .into_iter()
            .map(|((level, category), count)| LogVolume { level, category, count })
            .collect();
        volumes.sort_by_key(|v| (v.level as u8, v.category as u8));

        Ok(LogStats {
            volumes,
            recent_errors: errors,
        })
    }
}

#[async_trait]
impl PlatformLogSink for MemoryStore {
    async fn append(&self, entry: PlatformLog) {
        if let Err(e) = self.append_log(entry).await {
            debug!("platform log append failed: {e}");
        }
    }
}
