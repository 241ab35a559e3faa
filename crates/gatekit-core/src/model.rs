//! Persisted entity shapes
//!
//! These are the logical entities of the gateway: the tenant boundary
//! (Project), configured provider instances (PlatformConfig), API keys,
//! message/reaction history, the identity graph, webhook subscribers and
//! their delivery records, and the per-platform log stream. The store crate
//! persists them; nothing here knows about storage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Project environment, also the source of the API-key `env` segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Key-prefix segment for API keys minted in this environment
    pub fn key_segment(&self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Staging => "stg",
            Self::Production => "live",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

/// Tenant boundary. Owns every other tenant-scoped entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    /// URL-safe, unique across the deployment
    pub slug: String,
    pub name: String,
    pub environment: Environment,
    pub owner_id: String,
    /// At most one default project per owner
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership role, strict hierarchy owner > admin > member > viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MemberRole {
    /// Numeric rank; higher outranks lower
    pub fn rank(&self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Admin => 2,
            Self::Member => 1,
            Self::Viewer => 0,
        }
    }

    /// True when this role meets or exceeds `other`
    pub fn at_least(&self, other: MemberRole) -> bool {
        self.rank() >= other.rank()
    }
}

/// Project membership. The owner is implicit and never stored as a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub added_at: DateTime<Utc>,
}

/// API key record. The plaintext is returned once at creation/roll and is
/// never reconstructible from this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub project_id: String,
    /// SHA-256 of the full token, hex-encoded; unique
    pub key_hash: String,
    /// First 8 visible characters
    pub key_prefix: String,
    /// Last 4 visible characters
    pub key_suffix: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// A future timestamp here means the key is inside a roll grace window
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

impl ApiKey {
    /// Masked display form, `prefix…suffix`
    pub fn masked(&self) -> String {
        format!("{}\u{2026}{}", self.key_prefix, self.key_suffix)
    }

    /// A key validates while not expired and not past its revocation instant
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires) = self.expires_at {
            if expires < now {
                return false;
            }
        }
        if let Some(revoked) = self.revoked_at {
            if revoked <= now {
                return false;
            }
        }
        true
    }
}

/// One configured provider instance inside a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub id: String,
    pub project_id: String,
    /// Provider name from the registry (e.g. "telegram")
    pub platform: String,
    /// Opaque ciphertext of the provider-specific credentials object
    pub credentials_encrypted: String,
    /// Random UUID forming the inbound webhook URL secret; unique
    pub webhook_token: String,
    pub is_active: bool,
    pub test_mode: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformConfig {
    /// Connection-pool key for this config
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey::new(&self.project_id, &self.id)
    }
}

/// Derived identifier `"{projectId}:{platformConfigId}"` keying adapter
/// lifecycle and the in-memory connection pool. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub project_id: String,
    pub platform_config_id: String,
}

impl ConnectionKey {
    pub fn new(project_id: impl Into<String>, platform_config_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            platform_config_id: platform_config_id.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_id, self.platform_config_id)
    }
}

/// Kind of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Callback,
    Other,
}

/// Inbound message as persisted. `(platform_config_id, provider_message_id)`
/// is unique; duplicate webhook redeliveries collapse onto one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub id: String,
    pub project_id: String,
    pub platform_config_id: String,
    pub platform: String,
    pub provider_message_id: String,
    pub provider_chat_id: String,
    pub provider_user_id: String,
    pub user_display: Option<String>,
    pub message_text: Option<String>,
    pub message_kind: MessageKind,
    /// Provider-native payload, stored opaquely
    pub raw_data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Reaction event direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Added,
    Removed,
}

/// Inbound reaction event. Current visibility is computed at read time from
/// the latest event per `(provider_message_id, provider_user_id, emoji)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedReaction {
    pub id: String,
    pub project_id: String,
    pub platform_config_id: String,
    pub provider_message_id: String,
    pub provider_user_id: String,
    pub user_display: Option<String>,
    pub emoji: String,
    pub reaction_kind: ReactionKind,
    pub received_at: DateTime<Utc>,
}

/// Terminal and pending states of an outbound message row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentStatus {
    Pending,
    Sent,
    Failed,
}

/// One outbound target of one send job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    pub project_id: String,
    pub platform_config_id: String,
    pub platform: String,
    pub job_id: String,
    pub provider_message_id: Option<String>,
    pub target_kind: crate::target::TargetKind,
    pub target_chat_id: String,
    pub target_user_id: Option<String>,
    pub message_text: Option<String>,
    /// Opaque structured content as accepted on the send API
    pub message_content: serde_json::Value,
    pub status: SentStatus,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// How an alias got linked to an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethod {
    Manual,
    Automatic,
}

/// Unified cross-platform identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub project_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One platform-user tuple linked to an identity.
/// `(platform_config_id, provider_user_id)` maps to at most one alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAlias {
    pub id: String,
    pub identity_id: String,
    pub project_id: String,
    pub platform_config_id: String,
    pub platform: String,
    pub provider_user_id: String,
    pub provider_user_display: Option<String>,
    pub link_method: LinkMethod,
    pub linked_at: DateTime<Utc>,
}

/// Webhook subscriber endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub url: String,
    /// Subset of the event catalog
    pub events: Vec<String>,
    /// HMAC secret; generated when not supplied at registration
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Delivery attempt outcome for a subscriber webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookDeliveryStatus {
    Pending,
    Success,
    Failed,
}

/// Per-event delivery record for one subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    pub id: String,
    pub webhook_id: String,
    pub project_id: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: WebhookDeliveryStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<u16>,
    /// Truncated response body from the last attempt
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Severity of a platform log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Authoritative category of a platform log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Connection,
    Webhook,
    Message,
    Error,
    Auth,
    General,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Webhook => "webhook",
            Self::Message => "message",
            Self::Error => "error",
            Self::Auth => "auth",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// Append-only per-platform log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformLog {
    pub id: String,
    pub project_id: String,
    pub platform_config_id: Option<String>,
    pub platform: String,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FromStr for LogLevel {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(GatewayError::validation(
                "level",
                format!("unknown log level `{other}`"),
            )),
        }
    }
}

impl FromStr for LogCategory {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection" => Ok(Self::Connection),
            "webhook" => Ok(Self::Webhook),
            "message" => Ok(Self::Message),
            "error" => Ok(Self::Error),
            "auth" => Ok(Self::Auth),
            "general" => Ok(Self::General),
            other => Err(GatewayError::validation(
                "category",
                format!("unknown log category `{other}`"),
            )),
        }
    }
}
