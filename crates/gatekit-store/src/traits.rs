//! Repository traits
//!
//! One trait per aggregate, plus the [`Store`] supertrait the rest of the
//! gateway is written against. Nothing ORM-shaped leaks out of here: inputs
//! and outputs are the entity types from `gatekit-core`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gatekit_core::{
    ApiKey, Identity, IdentityAlias, Pagination, PlatformConfig, PlatformLog, PlatformLogSink,
    Project, ProjectMember, ReceivedMessage, ReceivedReaction, SentMessage, SentStatus, Webhook,
    WebhookDelivery,
};

use crate::error::StoreResult;
use crate::types::{
    DeliveryFilter, LogFilter, LogStats, MessageStats, ReactionGroup, ReceivedMessageFilter,
};

/// Projects and membership
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert a project; `project.slug` must be unique
    async fn insert_project(&self, project: Project) -> StoreResult<Project>;
    async fn project_by_id(&self, id: &str) -> StoreResult<Option<Project>>;
    async fn project_by_slug(&self, slug: &str) -> StoreResult<Option<Project>>;
    async fn list_projects(&self, owner_id: Option<&str>) -> StoreResult<Vec<Project>>;
    async fn update_project(&self, project: Project) -> StoreResult<Project>;
    /// Delete a project and everything tenant-scoped under it
    async fn delete_project(&self, id: &str) -> StoreResult<()>;

    async fn add_member(&self, member: ProjectMember) -> StoreResult<ProjectMember>;
    async fn list_members(&self, project_id: &str) -> StoreResult<Vec<ProjectMember>>;
    async fn member(&self, project_id: &str, user_id: &str) -> StoreResult<Option<ProjectMember>>;
    async fn remove_member(&self, project_id: &str, user_id: &str) -> StoreResult<()>;
}

/// API keys
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Insert a key; `key.key_hash` must be unique
    async fn insert_key(&self, key: ApiKey) -> StoreResult<ApiKey>;
    async fn key_by_id(&self, id: &str) -> StoreResult<Option<ApiKey>>;
    async fn key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;
    /// All keys of a project, revoked included; callers filter
    async fn list_keys(&self, project_id: &str) -> StoreResult<Vec<ApiKey>>;
    /// Set `revoked_at` if not already set; returns the stored key
    async fn revoke_key(&self, id: &str, at: DateTime<Utc>) -> StoreResult<ApiKey>;
    /// Best-effort `last_used_at` update; absent keys are ignored
    async fn touch_key(&self, id: &str, at: DateTime<Utc>);
    /// Atomic roll: revoke the old key at `revoke_old_at` and insert the
    /// replacement in one transaction.
    async fn roll_key(
        &self,
        old_id: &str,
        revoke_old_at: DateTime<Utc>,
        replacement: ApiKey,
    ) -> StoreResult<ApiKey>;
}

/// Platform configurations
#[async_trait]
pub trait PlatformConfigStore: Send + Sync {
    /// Insert a config; `webhook_token` must be unique
    async fn insert_platform(&self, config: PlatformConfig) -> StoreResult<PlatformConfig>;
    async fn platform_by_id(&self, id: &str) -> StoreResult<Option<PlatformConfig>>;
    async fn platform_by_webhook_token(&self, token: &str)
        -> StoreResult<Option<PlatformConfig>>;
    async fn list_platforms(&self, project_id: &str) -> StoreResult<Vec<PlatformConfig>>;
    /// Every active config across all projects, for the boot sweep
    async fn list_active_platforms(&self) -> StoreResult<Vec<PlatformConfig>>;
    async fn update_platform(&self, config: PlatformConfig) -> StoreResult<PlatformConfig>;
    async fn delete_platform(&self, id: &str) -> StoreResult<()>;
}

/// Received and sent messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert an inbound message; duplicates on
    /// `(platform_config_id, provider_message_id)` surface as `Duplicate`.
    async fn insert_received(&self, message: ReceivedMessage) -> StoreResult<ReceivedMessage>;
    async fn received_by_id(&self, id: &str) -> StoreResult<Option<ReceivedMessage>>;
    async fn list_received(
        &self,
        project_id: &str,
        filter: &ReceivedMessageFilter,
        page: Pagination,
    ) -> StoreResult<Vec<ReceivedMessage>>;
    /// Delete received messages older than `before`; returns deleted count
    async fn delete_received_before(
        &self,
        project_id: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn insert_sent(&self, message: SentMessage) -> StoreResult<SentMessage>;
    async fn sent_by_id(&self, id: &str) -> StoreResult<Option<SentMessage>>;
    async fn list_sent(&self, project_id: &str, page: Pagination) -> StoreResult<Vec<SentMessage>>;
    async fn sent_by_job(&self, job_id: &str) -> StoreResult<Vec<SentMessage>>;
    /// Transition a sent row out of `pending`. Only `pending -> sent` and
    /// `pending -> failed` are legal.
    async fn update_sent_status(
        &self,
        id: &str,
        status: SentStatus,
        provider_message_id: Option<String>,
        error_message: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<SentMessage>;

    async fn message_stats(&self, project_id: &str) -> StoreResult<MessageStats>;
}

/// Reaction events
#[async_trait]
pub trait ReactionStore: Send + Sync {
    async fn insert_reaction(&self, reaction: ReceivedReaction) -> StoreResult<ReceivedReaction>;
    async fn list_reactions(
        &self,
        project_id: &str,
        provider_message_id: Option<&str>,
        page: Pagination,
    ) -> StoreResult<Vec<ReceivedReaction>>;
    /// Visible reaction state: one group per emoji, holding the users whose
    /// latest event for that emoji is `added`.
    async fn current_reactions(
        &self,
        platform_config_id: &str,
        provider_message_id: &str,
    ) -> StoreResult<Vec<ReactionGroup>>;
}

/// Identity graph
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn insert_identity(&self, identity: Identity) -> StoreResult<Identity>;
    async fn identity_by_id(&self, id: &str) -> StoreResult<Option<Identity>>;
    async fn list_identities(&self, project_id: &str, page: Pagination)
        -> StoreResult<Vec<Identity>>;
    async fn update_identity(&self, identity: Identity) -> StoreResult<Identity>;
    /// Delete an identity and cascade its aliases
    async fn delete_identity(&self, id: &str) -> StoreResult<()>;

    /// Insert an alias; `(platform_config_id, provider_user_id)` must be
    /// unique.
    async fn insert_alias(&self, alias: IdentityAlias) -> StoreResult<IdentityAlias>;
    async fn alias_by_tuple(
        &self,
        platform_config_id: &str,
        provider_user_id: &str,
    ) -> StoreResult<Option<IdentityAlias>>;
    async fn list_aliases(&self, identity_id: &str) -> StoreResult<Vec<IdentityAlias>>;
    async fn remove_alias(&self, alias_id: &str) -> StoreResult<()>;
}

/// Webhook subscribers and their deliveries
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert_webhook(&self, webhook: Webhook) -> StoreResult<Webhook>;
    async fn webhook_by_id(&self, id: &str) -> StoreResult<Option<Webhook>>;
    async fn list_webhooks(&self, project_id: &str) -> StoreResult<Vec<Webhook>>;
    async fn update_webhook(&self, webhook: Webhook) -> StoreResult<Webhook>;
    async fn delete_webhook(&self, id: &str) -> StoreResult<()>;

    async fn insert_delivery(&self, delivery: WebhookDelivery) -> StoreResult<WebhookDelivery>;
    async fn delivery_by_id(&self, id: &str) -> StoreResult<Option<WebhookDelivery>>;
    async fn update_delivery(&self, delivery: WebhookDelivery) -> StoreResult<WebhookDelivery>;
    async fn list_deliveries(
        &self,
        webhook_id: &str,
        filter: &DeliveryFilter,
        page: Pagination,
    ) -> StoreResult<Vec<WebhookDelivery>>;
}

/// Append-only platform log stream
#[async_trait]
pub trait PlatformLogStore: Send + Sync {
    async fn append_log(&self, entry: PlatformLog) -> StoreResult<()>;
    async fn query_logs(
        &self,
        project_id: &str,
        filter: &LogFilter,
        page: Pagination,
    ) -> StoreResult<Vec<PlatformLog>>;
    /// Counts grouped by (level, category) plus the `recent` most-recent
    /// error entries.
    async fn log_stats(&self, project_id: &str, recent: usize) -> StoreResult<LogStats>;
}

/// The full persistence surface
pub trait Store:
    ProjectStore
    + ApiKeyStore
    + PlatformConfigStore
    + MessageStore
    + ReactionStore
    + IdentityStore
    + WebhookStore
    + PlatformLogStore
    + PlatformLogSink
{
}

impl<T> Store for T where
    T: ProjectStore
        + ApiKeyStore
        + PlatformConfigStore
        + MessageStore
        + ReactionStore
        + IdentityStore
        + WebhookStore
        + PlatformLogStore
        + PlatformLogSink
{
}
