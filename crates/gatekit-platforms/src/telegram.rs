//! Telegram Bot API adapter
//!
//! Webhook-class adapter. Connection creation registers the bot webhook at
//! `{base_url}/api/v1/webhooks/telegram/{webhookToken}` with allowed updates
//! {message, callback_query, inline_query}. Inbound `message` updates become
//! text envelopes; `callback_query` updates become button actions and are
//! auto-acknowledged. Outbound sends use HTML parse mode; the thread id is
//! the chat id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use gatekit_core::{ConnectionKey, Envelope, PlatformConfig, PlatformLifecycleEvent,
    PlatformLifecycleKind, ReplyPayload};

use crate::error::{PlatformError, PlatformResult, SendError, SendReceipt};
use crate::pool::{credentials_fingerprint, ConnectionPool};
use crate::spi::{
    Capability, ConnectionType, EnvelopeSink, PlatformConnection, PlatformProvider,
    ProviderDescriptor, WebhookRequest,
};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram credentials as stored (decrypted) on the platform config
#[derive(Debug, Clone, Deserialize)]
struct TelegramCredentials {
    token: String,
    #[serde(default, rename = "botUsername")]
    _bot_username: Option<String>,
}

/// Telegram platform provider
pub struct TelegramProvider {
    /// Public gateway base URL, for webhook registration
    base_url: String,
    /// Bot API base, overridable for tests
    api_base: String,
    pool: ConnectionPool,
    sink: Arc<dyn EnvelopeSink>,
}

impl TelegramProvider {
    pub fn new(base_url: impl Into<String>, sink: Arc<dyn EnvelopeSink>) -> Self {
        Self::with_api_base(base_url, TELEGRAM_API_BASE, sink)
    }

    pub fn with_api_base(
        base_url: impl Into<String>,
        api_base: impl Into<String>,
        sink: Arc<dyn EnvelopeSink>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_base: api_base.into(),
            pool: ConnectionPool::new(),
            sink,
        }
    }

    fn parse_credentials(credentials: &serde_json::Value) -> PlatformResult<TelegramCredentials> {
        let creds: TelegramCredentials = serde_json::from_value(credentials.clone())
            .map_err(|e| PlatformError::Credentials(format!("invalid Telegram credentials: {e}")))?;
        if creds.token.is_empty() {
            return Err(PlatformError::Credentials("bot token is required".into()));
        }
        Ok(creds)
    }
}

/// One live Telegram bot connection
struct TelegramConnection {
    token: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

impl TelegramConnection {
    fn new(token: String, api_base: String) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Api(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { token, api_base, http })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<serde_json::Value, SendError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    // Per-call timeouts do not retry
                    SendError::permanent(format!("request timed out: {e}"))
                } else {
                    SendError::transient(format!("request failed: {e}"))
                }
            })?;

        let api: TelegramApiResponse = response
            .json()
            .await
            .map_err(|e| SendError::transient(format!("invalid API response: {e}")))?;

        if !api.ok {
            let description = api
                .description
                .unwrap_or_else(|| "unknown Telegram error".to_string());
            return Err(classify_telegram_error(api.error_code, description));
        }
        Ok(api.result.unwrap_or(serde_json::Value::Null))
    }

    async fn set_webhook(&self, url: &str) -> PlatformResult<()> {
        self.call(
            "setWebhook",
            json!({
                "url": url,
                "allowed_updates": ["message", "callback_query", "inline_query"],
            }),
        )
        .await
        .map_err(|e| PlatformError::Api(format!("setWebhook failed: {}", e.message())))?;
        debug!(url, "telegram webhook registered");
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) {
        let result = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_query_id }))
            .await;
        if let Err(e) = result {
            warn!("answerCallbackQuery failed: {}", e.message());
        }
    }

    fn inline_keyboard(reply: &ReplyPayload) -> Option<serde_json::Value> {
        if reply.buttons.is_empty() {
            return None;
        }
        let row: Vec<serde_json::Value> = reply
            .buttons
            .iter()
            .map(|button| {
                if let Some(url) = &button.url {
                    json!({ "text": button.text, "url": url })
                } else {
                    json!({
                        "text": button.text,
                        "callback_data": button.value.clone().unwrap_or_else(|| button.text.clone()),
                    })
                }
            })
            .collect();
        Some(json!({ "inline_keyboard": [row] }))
    }
}

/// Map Telegram API failures onto the send taxonomy. Client errors are
/// permanent, throttling and server errors retry.
fn classify_telegram_error(error_code: Option<u16>, description: String) -> SendError {
    match error_code {
        Some(400 | 401 | 403 | 404) => SendError::Permanent(description),
        Some(429) => SendError::Transient(description),
        Some(code) if code >= 500 => SendError::Transient(description),
        _ => SendError::Unclassified(description),
    }
}

#[async_trait]
impl PlatformConnection for TelegramConnection {
    async fn send_message(
        &self,
        _envelope: &Envelope,
        reply: &ReplyPayload,
    ) -> Result<SendReceipt, SendError> {
        let chat_id = reply
            .thread_id
            .as_deref()
            .ok_or_else(|| SendError::permanent("target chat id not provided"))?;

        // Attachments go out first; Telegram carries the caption on the media
        if let Some(attachment) = reply.attachments.first() {
            let Some(url) = &attachment.url else {
                return Err(SendError::permanent(
                    "telegram attachments require a url; inline data is not supported",
                ));
            };
            let is_image = attachment
                .mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with("image/"));
            let method = if is_image { "sendPhoto" } else { "sendDocument" };
            let media_key = if is_image { "photo" } else { "document" };

            let mut payload = json!({
                "chat_id": chat_id,
                media_key: url,
                "parse_mode": "HTML",
            });
            if let Some(caption) = attachment.caption.as_deref().or(reply.text.as_deref()) {
                payload["caption"] = json!(caption);
            }
            let result = self.call(method, payload).await?;
            return Ok(SendReceipt {
                provider_message_id: result
                    .get("message_id")
                    .and_then(|v| v.as_i64())
                    .map(|id| id.to_string()),
            });
        }

        let text = reply
            .text
            .as_deref()
            .ok_or_else(|| SendError::permanent("message text not provided"))?;

        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = Self::inline_keyboard(reply) {
            payload["reply_markup"] = keyboard;
        }
        if let Some(reply_to) = &reply.reply_to {
            if let Ok(id) = reply_to.parse::<i64>() {
                payload["reply_to_message_id"] = json!(id);
            }
        }
        if reply.silent {
            payload["disable_notification"] = json!(true);
        }

        let result = self.call("sendMessage", payload).await?;
        Ok(SendReceipt {
            provider_message_id: result
                .get("message_id")
                .and_then(|v| v.as_i64())
                .map(|id| id.to_string()),
        })
    }

    async fn close(&self) {
        // Webhook connections hold no sockets; nothing to release
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[async_trait]
impl PlatformProvider for TelegramProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "telegram",
            display_name: "Telegram",
            connection_type: ConnectionType::Webhook,
            capabilities: vec![
                Capability::SendMessage,
                Capability::ReceiveMessage,
                Capability::Attachments,
                Capability::Buttons,
            ],
        }
    }

    async fn create_connection(
        &self,
        key: &ConnectionKey,
        config: &PlatformConfig,
        credentials: &serde_json::Value,
    ) -> PlatformResult<Arc<dyn PlatformConnection>> {
        let creds = Self::parse_credentials(credentials)?;
        let fingerprint = credentials_fingerprint(credentials);
        let api_base = self.api_base.clone();
        let webhook_url = format!(
            "{}/api/v1/webhooks/telegram/{}",
            self.base_url, config.webhook_token
        );

        self.pool
            .get_or_create(key, fingerprint, || async move {
                let connection = TelegramConnection::new(creds.token, api_base)?;
                connection.set_webhook(&webhook_url).await?;
                Ok(Arc::new(connection) as Arc<dyn PlatformConnection>)
            })
            .await
    }

    async fn get_connection(&self, key: &ConnectionKey) -> Option<Arc<dyn PlatformConnection>> {
        self.pool.get(key).await
    }

    async fn remove_connection(&self, key: &ConnectionKey) {
        self.pool.remove(key).await;
    }

    async fn on_platform_event(&self, event: &PlatformLifecycleEvent) -> PlatformResult<()> {
        match event.kind {
            // Register the webhook eagerly so Telegram starts delivering
            // before the first outbound send.
            PlatformLifecycleKind::Created
            | PlatformLifecycleKind::Activated
            | PlatformLifecycleKind::Updated => {
                self.create_connection(
                    &event.config.connection_key(),
                    &event.config,
                    &event.credentials,
                )
                .await?;
                Ok(())
            }
            PlatformLifecycleKind::Deactivated | PlatformLifecycleKind::Deleted => {
                self.remove_connection(&event.config.connection_key()).await;
                Ok(())
            }
        }
    }

    fn to_envelope(
        &self,
        payload: &serde_json::Value,
        config: &PlatformConfig,
    ) -> PlatformResult<Vec<Envelope>> {
        let mut envelopes = Vec::new();

        if let Some(message) = payload.get("message") {
            let Some(text) = message.get("text").and_then(|t| t.as_str()) else {
                // Non-text updates (joins, stickers, ...) are ignored
                return Ok(envelopes);
            };
            let message_id = require_i64(message, "message_id")?;
            let chat_id = require_i64(message.get("chat").unwrap_or(&serde_json::Value::Null), "id")?;
            let from = message
                .get("from")
                .ok_or_else(|| PlatformError::Parse("message.from missing".into()))?;
            let user_id = require_i64(from, "id")?;
            let display = from
                .get("username")
                .or_else(|| from.get("first_name"))
                .and_then(|v| v.as_str())
                .map(str::to_string);

            let envelope = Envelope::builder("telegram", &config.project_id)
                .platform_config_id(&config.id)
                .thread_id(chat_id.to_string())
                .user(user_id.to_string(), display)
                .text(text)
                .provider(message_id.to_string(), payload.clone())
                .build()
                .map_err(|e| PlatformError::Parse(e.to_string()))?;
            envelopes.push(envelope);
        }

        if let Some(callback) = payload.get("callback_query") {
            let callback_id = callback
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| PlatformError::Parse("callback_query.id missing".into()))?;
            let data = callback
                .get("data")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let from = callback
                .get("from")
                .ok_or_else(|| PlatformError::Parse("callback_query.from missing".into()))?;
            let user_id = require_i64(from, "id")?;
            let display = from
                .get("username")
                .or_else(|| from.get("first_name"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let chat_id = callback
                .get("message")
                .and_then(|m| m.get("chat"))
                .and_then(|c| c.get("id"))
                .and_then(|v| v.as_i64());

            let mut builder = Envelope::builder("telegram", &config.project_id)
                .platform_config_id(&config.id)
                .user(user_id.to_string(), display)
                .action("button", data)
                .provider(callback_id, payload.clone());
            if let Some(chat_id) = chat_id {
                builder = builder.thread_id(chat_id.to_string());
            }
            envelopes.push(
                builder
                    .build()
                    .map_err(|e| PlatformError::Parse(e.to_string()))?,
            );
        }

        Ok(envelopes)
    }

    fn webhook_path(&self) -> Option<String> {
        Some("/api/v1/webhooks/telegram/:webhookToken".to_string())
    }

    async fn handle_webhook(&self, request: WebhookRequest) -> PlatformResult<serde_json::Value> {
        let envelopes = self.to_envelope(&request.body, &request.config)?;

        // Auto-ACK callback queries so Telegram clears the button spinner
        if let Some(callback_id) = request
            .body
            .get("callback_query")
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_str())
        {
            if let Ok(creds) = Self::parse_credentials(&request.credentials) {
                if let Ok(connection) = TelegramConnection::new(creds.token, self.api_base.clone()) {
                    connection.answer_callback_query(callback_id).await;
                }
            }
        }

        for envelope in envelopes {
            self.sink.publish(envelope).await;
        }
        Ok(json!({ "ok": true }))
    }

    async fn connection_count(&self) -> usize {
        self.pool.len().await
    }

    async fn shutdown(&self) {
        self.pool.drain().await;
    }
}

fn require_i64(value: &serde_json::Value, field: &str) -> PlatformResult<i64> {
    value
        .get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| PlatformError::Parse(format!("{field} missing or not a number")))
}
