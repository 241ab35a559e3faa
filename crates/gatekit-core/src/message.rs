//! Outbound message content model
//!
//! `SendContent`/`SendOptions`/`SendMetadata` are the shapes accepted on the
//! send API and carried through the job queue; `ReplyPayload` is the flat
//! form handed to platform adapters. Attachments accept either a URL or
//! base64 data.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// File attachment, by URL or inline base64 data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub url: Option<String>,
    /// Base64-encoded content, alternative to `url`
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Interactive button
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    /// Callback value delivered back as `action.value` on click
    #[serde(default)]
    pub value: Option<String>,
    /// Link buttons open this URL instead of sending a callback
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

/// Embed field (platforms that support rich embeds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich embed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// RGB color as 0xRRGGBB
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

/// Content block of a send request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    /// Provider-specific pass-through options, stored opaquely
    #[serde(default)]
    pub platform_options: Option<serde_json::Value>,
}

impl SendContent {
    /// A send must carry at least one of text, attachments, or embeds
    pub fn validate(&self) -> GatewayResult<()> {
        let has_text = self.text.as_deref().is_some_and(|t| !t.is_empty());
        if !has_text && self.attachments.is_empty() && self.embeds.is_empty() {
            return Err(GatewayError::validation(
                "content",
                "must include at least one of text, attachments, or embeds",
            ));
        }
        for attachment in &self.attachments {
            if attachment.url.is_none() && attachment.data.is_none() {
                return Err(GatewayError::validation(
                    "content.attachments",
                    "attachment requires either url or data",
                ));
            }
        }
        Ok(())
    }
}

/// Delivery options of a send request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub silent: bool,
    /// Earliest delivery time (RFC 3339); absent means immediate
    #[serde(default)]
    pub scheduled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Caller-supplied tracking metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMetadata {
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// Flat reply shape handed to `PlatformConnection::send_message`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    /// Platform chat/channel to send into
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

impl ReplyPayload {
    /// Derive the adapter reply from accepted content and options
    pub fn from_request(content: &SendContent, options: &SendOptions, thread_id: &str) -> Self {
        Self {
            text: content.text.clone(),
            attachments: content.attachments.clone(),
            buttons: content.buttons.clone(),
            embeds: content.embeds.clone(),
            thread_id: Some(thread_id.to_string()),
            reply_to: options.reply_to.clone(),
            silent: options.silent,
        }
    }
}
