//! Canonical message envelope
//!
//! The Envelope is the sole type exchanged between platform adapters and the
//! pipelines: adapters translate provider-native payloads into envelopes on
//! the way in and consume envelopes on the way out. Neither side ever sees
//! the other's native types; the provider payload survives only as the
//! opaque `provider.raw` blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::model::ReactionKind;

/// Wire version of the envelope format
pub const ENVELOPE_VERSION: &str = "1";

/// The user the event originates from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeUser {
    /// Platform-native user identifier
    pub provider_user_id: String,
    /// Username or display name when the platform supplies one
    #[serde(default)]
    pub display: Option<String>,
}

/// Textual message content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    #[serde(default)]
    pub text: Option<String>,
}

/// Interactive action (button click, callback)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeAction {
    /// Action kind, e.g. "button"
    #[serde(rename = "type")]
    pub kind: String,
    /// Platform-supplied action value (callback data, custom id)
    pub value: String,
}

/// Reaction carried by a reaction-event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeReaction {
    pub emoji: String,
    pub kind: ReactionKind,
}

/// Provider-side event identity plus the opaque raw payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeProvider {
    /// Platform-native event/message id, used for dedup
    pub event_id: String,
    /// Provider payload, stored opaquely and never interpreted upstream
    pub raw: serde_json::Value,
}

/// Envelope v1 — the canonical in-memory message object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: String,
    /// ULID, assigned at translation time
    pub id: String,
    pub ts: DateTime<Utc>,
    /// Platform name ("telegram", "discord", ...)
    pub channel: String,
    pub project_id: String,
    /// PlatformConfig the event belongs to
    pub platform_config_id: String,
    /// Platform chat/channel id
    #[serde(default)]
    pub thread_id: Option<String>,
    pub user: EnvelopeUser,
    #[serde(default)]
    pub message: EnvelopeMessage,
    #[serde(default)]
    pub action: Option<EnvelopeAction>,
    #[serde(default)]
    pub reaction: Option<EnvelopeReaction>,
    pub provider: EnvelopeProvider,
}

impl Envelope {
    /// Start building an envelope for the given channel and project
    pub fn builder(channel: impl Into<String>, project_id: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder {
            channel: channel.into(),
            project_id: project_id.into(),
            platform_config_id: String::new(),
            thread_id: None,
            user: None,
            text: None,
            action: None,
            reaction: None,
            event_id: None,
            raw: serde_json::Value::Null,
        }
    }

    /// True when this envelope represents a reaction event
    pub fn is_reaction(&self) -> bool {
        self.reaction.is_some()
    }

    /// Enforce the envelope invariant: project, channel, user id and provider
    /// event id must all be non-empty.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.project_id.is_empty() {
            return Err(GatewayError::validation("project_id", "must not be empty"));
        }
        if self.channel.is_empty() {
            return Err(GatewayError::validation("channel", "must not be empty"));
        }
        if self.user.provider_user_id.is_empty() {
            return Err(GatewayError::validation(
                "user.provider_user_id",
                "must not be empty",
            ));
        }
        if self.provider.event_id.is_empty() {
            return Err(GatewayError::validation(
                "provider.event_id",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Builder for [`Envelope`]
pub struct EnvelopeBuilder {
    channel: String,
    project_id: String,
    platform_config_id: String,
    thread_id: Option<String>,
    user: Option<EnvelopeUser>,
    text: Option<String>,
    action: Option<EnvelopeAction>,
    reaction: Option<EnvelopeReaction>,
    event_id: Option<String>,
    raw: serde_json::Value,
}

impl EnvelopeBuilder {
    pub fn platform_config_id(mut self, platform_config_id: impl Into<String>) -> Self {
        self.platform_config_id = platform_config_id.into();
        self
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn user(mut self, provider_user_id: impl Into<String>, display: Option<String>) -> Self {
        self.user = Some(EnvelopeUser {
            provider_user_id: provider_user_id.into(),
            display,
        });
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn action(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.action = Some(EnvelopeAction {
            kind: kind.into(),
            value: value.into(),
        });
        self
    }

    pub fn reaction(mut self, emoji: impl Into<String>, kind: ReactionKind) -> Self {
        self.reaction = Some(EnvelopeReaction {
            emoji: emoji.into(),
            kind,
        });
        self
    }

    pub fn provider(mut self, event_id: impl Into<String>, raw: serde_json::Value) -> Self {
        self.event_id = Some(event_id.into());
        self.raw = raw;
        self
    }

    /// Finalize, assigning a fresh ULID and the current timestamp
    pub fn build(self) -> GatewayResult<Envelope> {
        let envelope = Envelope {
            version: ENVELOPE_VERSION.to_string(),
            id: ulid::Ulid::new().to_string(),
            ts: Utc::now(),
            channel: self.channel,
            project_id: self.project_id,
            platform_config_id: self.platform_config_id,
            thread_id: self.thread_id,
            user: self.user.ok_or_else(|| {
                GatewayError::validation("user", "envelope requires a user")
            })?,
            message: EnvelopeMessage { text: self.text },
            action: self.action,
            reaction: self.reaction,
            provider: EnvelopeProvider {
                event_id: self.event_id.ok_or_else(|| {
                    GatewayError::validation("provider.event_id", "envelope requires an event id")
                })?,
                raw: self.raw,
            },
        };
        envelope.validate()?;
        Ok(envelope)
    }
}
