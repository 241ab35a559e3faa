//! Discord adapter
//!
//! Websocket-class adapter. Each connection runs a gateway client (v10 JSON
//! encoding): HELLO starts the heartbeat task, IDENTIFY subscribes with the
//! Guilds, GuildMessages, MessageContent and DirectMessages intents, and the
//! dispatch loop translates MESSAGE_CREATE / INTERACTION_CREATE events into
//! envelopes. Outbound sends go through the REST API. A hard per-process
//! connection cap applies; excess creations are rejected explicitly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use gatekit_core::{ConnectionKey, Envelope, PlatformConfig, ReplyPayload};

use crate::error::{PlatformError, PlatformResult, SendError, SendReceipt};
use crate::pool::{credentials_fingerprint, ConnectionPool};
use crate::spi::{
    Capability, ConnectionType, EnvelopeSink, PlatformConnection, PlatformProvider,
    ProviderDescriptor,
};

/// Hard cap on live Discord gateway connections per process
pub const MAX_DISCORD_CONNECTIONS: usize = 100;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Guilds | GuildMessages | DirectMessages | MessageContent
const GATEWAY_INTENTS: u64 = 1 | (1 << 9) | (1 << 12) | (1 << 15);

#[derive(Debug, Clone, Deserialize)]
struct DiscordCredentials {
    token: String,
}

/// Discord platform provider
pub struct DiscordProvider {
    api_base: String,
    gateway_url: String,
    pool: ConnectionPool,
    sink: Arc<dyn EnvelopeSink>,
}

impl DiscordProvider {
    pub fn new(sink: Arc<dyn EnvelopeSink>) -> Self {
        Self::with_endpoints(DISCORD_API_BASE, DISCORD_GATEWAY_URL, sink)
    }

    pub fn with_endpoints(
        api_base: impl Into<String>,
        gateway_url: impl Into<String>,
        sink: Arc<dyn EnvelopeSink>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            gateway_url: gateway_url.into(),
            pool: ConnectionPool::new(),
            sink,
        }
    }

    fn parse_credentials(credentials: &serde_json::Value) -> PlatformResult<DiscordCredentials> {
        let creds: DiscordCredentials = serde_json::from_value(credentials.clone())
            .map_err(|e| PlatformError::Credentials(format!("invalid Discord credentials: {e}")))?;
        if creds.token.is_empty() {
            return Err(PlatformError::Credentials("bot token is required".into()));
        }
        Ok(creds)
    }

    fn ensure_capacity(live: usize) -> PlatformResult<()> {
        if live >= MAX_DISCORD_CONNECTIONS {
            return Err(PlatformError::ConnectionLimit(format!(
                "discord connection limit ({MAX_DISCORD_CONNECTIONS}) reached"
            )));
        }
        Ok(())
    }
}

/// One live Discord connection: a gateway reader plus REST sender
struct DiscordConnection {
    token: String,
    api_base: String,
    http: reqwest::Client,
    reader: Mutex<Option<JoinHandle<()>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl DiscordConnection {
    async fn open(
        token: String,
        api_base: String,
        gateway_url: &str,
        config: &PlatformConfig,
        sink: Arc<dyn EnvelopeSink>,
    ) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Api(format!("failed to create HTTP client: {e}")))?;

        let (stream, _) = connect_async(gateway_url)
            .await
            .map_err(|e| PlatformError::Api(format!("gateway connect failed: {e}")))?;
        let (write, mut read) = stream.split();
        let write = Arc::new(Mutex::new(write));

        // HELLO carries the heartbeat interval
        let hello = read
            .next()
            .await
            .ok_or_else(|| PlatformError::Api("gateway closed before HELLO".into()))
            .and_then(|m| m.map_err(|e| PlatformError::Api(format!("gateway read failed: {e}"))))?;
        let hello: serde_json::Value = match hello {
            WsMessage::Text(text) => serde_json::from_str(&text)
                .map_err(|e| PlatformError::Parse(format!("invalid HELLO frame: {e}")))?,
            other => {
                return Err(PlatformError::Parse(format!(
                    "unexpected first gateway frame: {other:?}"
                )))
            }
        };
        let heartbeat_ms = hello
            .pointer("/d/heartbeat_interval")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| PlatformError::Parse("HELLO missing heartbeat_interval".into()))?;

        // IDENTIFY with the declared intents
        let identify = json!({
            "op": 2,
            "d": {
                "token": token,
                "intents": GATEWAY_INTENTS,
                "properties": {"os": "linux", "browser": "gatekit", "device": "gatekit"},
            }
        });
        write
            .lock()
            .await
            .send(WsMessage::Text(identify.to_string()))
            .await
            .map_err(|e| PlatformError::Api(format!("IDENTIFY send failed: {e}")))?;

        let heartbeat = {
            let write = write.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat_ms));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let frame = json!({"op": 1, "d": null}).to_string();
                    if write.lock().await.send(WsMessage::Text(frame)).await.is_err() {
                        debug!("discord heartbeat channel closed");
                        break;
                    }
                }
            })
        };

        let reader = {
            let write = write.clone();
            let project_id = config.project_id.clone();
            let platform_config_id = config.id.clone();
            tokio::spawn(async move {
                while let Some(frame) = read.next().await {
                    let text = match frame {
                        Ok(WsMessage::Text(text)) => text,
                        Ok(WsMessage::Close(_)) | Err(_) => break,
                        Ok(_) => continue,
                    };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    match event.get("op").and_then(|v| v.as_u64()) {
                        Some(0) => {
                            let kind = event.get("t").and_then(|v| v.as_str()).unwrap_or_default();
                            let payload = event.get("d").cloned().unwrap_or(serde_json::Value::Null);
                            if let Some(envelope) =
                                dispatch_to_envelope(kind, &payload, &project_id, &platform_config_id)
                            {
                                sink.publish(envelope).await;
                            }
                        }
                        // Immediate heartbeat request
                        Some(1) => {
                            let frame = json!({"op": 1, "d": null}).to_string();
                            if write.lock().await.send(WsMessage::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                        Some(7) | Some(9) => {
                            warn!("discord gateway asked for reconnect, closing session");
                            break;
                        }
                        _ => {}
                    }
                }
                info!("discord gateway reader exited");
            })
        };

        Ok(Self {
            token,
            api_base,
            http,
            reader: Mutex::new(Some(reader)),
            heartbeat: Mutex::new(Some(heartbeat)),
        })
    }
}

/// Translate one gateway dispatch event into an envelope
fn dispatch_to_envelope(
    kind: &str,
    payload: &serde_json::Value,
    project_id: &str,
    platform_config_id: &str,
) -> Option<Envelope> {
    match kind {
        "MESSAGE_CREATE" => {
            let author = payload.get("author")?;
            // The bot's own messages echo back on the gateway; drop them
            if author.get("bot").and_then(|v| v.as_bool()).unwrap_or(false) {
                return None;
            }
            let envelope = Envelope::builder("discord", project_id)
                .platform_config_id(platform_config_id)
                .thread_id(payload.get("channel_id")?.as_str()?)
                .user(
                    author.get("id")?.as_str()?,
                    author.get("username").and_then(|v| v.as_str()).map(str::to_string),
                )
                .text(payload.get("content").and_then(|v| v.as_str()).unwrap_or_default())
                .provider(payload.get("id")?.as_str()?, payload.clone())
                .build()
                .ok()?;
            Some(envelope)
        }
        "INTERACTION_CREATE" => {
            let user = payload
                .pointer("/member/user")
                .or_else(|| payload.get("user"))?;
            let custom_id = payload.pointer("/data/custom_id")?.as_str()?;
            let mut builder = Envelope::builder("discord", project_id)
                .platform_config_id(platform_config_id)
                .user(
                    user.get("id")?.as_str()?,
                    user.get("username").and_then(|v| v.as_str()).map(str::to_string),
                )
                .action("button", custom_id)
                .provider(payload.get("id")?.as_str()?, payload.clone());
            if let Some(channel_id) = payload.get("channel_id").and_then(|v| v.as_str()) {
                builder = builder.thread_id(channel_id);
            }
            builder.build().ok()
        }
        _ => None,
    }
}

/// Map a REST response status onto the send taxonomy
fn classify_discord_status(status: u16, body: String) -> SendError {
    match status {
        400 | 401 | 403 | 404 => SendError::Permanent(body),
        429 => SendError::Transient(body),
        s if s >= 500 => SendError::Transient(body),
        _ => SendError::Unclassified(body),
    }
}

#[async_trait]
impl PlatformConnection for DiscordConnection {
    async fn send_message(
        &self,
        _envelope: &Envelope,
        reply: &ReplyPayload,
    ) -> Result<SendReceipt, SendError> {
        let channel_id = reply
            .thread_id
            .as_deref()
            .ok_or_else(|| SendError::permanent("target channel id not provided"))?;

        let mut body = json!({});
        if let Some(text) = &reply.text {
            body["content"] = json!(text);
        }
        if !reply.embeds.is_empty() {
            body["embeds"] = json!(reply
                .embeds
                .iter()
                .map(|embed| {
                    json!({
                        "title": embed.title,
                        "description": embed.description,
                        "color": embed.color,
                        "fields": embed.fields.iter().map(|f| json!({
                            "name": f.name, "value": f.value, "inline": f.inline,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect::<Vec<_>>());
        }
        if !reply.buttons.is_empty() {
            let components: Vec<serde_json::Value> = reply
                .buttons
                .iter()
                .map(|button| {
                    if let Some(url) = &button.url {
                        json!({"type": 2, "style": 5, "label": button.text, "url": url})
                    } else {
                        json!({
                            "type": 2,
                            "style": 2,
                            "label": button.text,
                            "custom_id": button.value.clone().unwrap_or_else(|| button.text.clone()),
                        })
                    }
                })
                .collect();
            body["components"] = json!([{ "type": 1, "components": components }]);
        }
        if let Some(reply_to) = &reply.reply_to {
            body["message_reference"] = json!({ "message_id": reply_to });
        }
        if reply.silent {
            // SUPPRESS_NOTIFICATIONS
            body["flags"] = json!(1 << 12);
        }

        let response = self
            .http
            .post(format!("{}/channels/{}/messages", self.api_base, channel_id))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::permanent(format!("request timed out: {e}"))
                } else {
                    SendError::transient(format!("request failed: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_discord_status(status, body));
        }

        let message: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SendError::transient(format!("invalid API response: {e}")))?;
        Ok(SendReceipt {
            provider_message_id: message.get("id").and_then(|v| v.as_str()).map(str::to_string),
        })
    }

    async fn close(&self) {
        // Every spawned task must die with the connection or it leaks
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[async_trait]
impl PlatformProvider for DiscordProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "discord",
            display_name: "Discord",
            connection_type: ConnectionType::Websocket,
            capabilities: vec![
                Capability::SendMessage,
                Capability::ReceiveMessage,
                Capability::Embeds,
                Capability::Buttons,
                Capability::Threads,
            ],
        }
    }

    async fn create_connection(
        &self,
        key: &ConnectionKey,
        config: &PlatformConfig,
        credentials: &serde_json::Value,
    ) -> PlatformResult<Arc<dyn PlatformConnection>> {
        // Reject before building anything so the cap cannot leak sockets
        if self.pool.get(key).await.is_none() {
            Self::ensure_capacity(self.pool.len().await)?;
        }

        let creds = Self::parse_credentials(credentials)?;
        let fingerprint = credentials_fingerprint(credentials);
        let api_base = self.api_base.clone();
        let gateway_url = self.gateway_url.clone();
        let sink = self.sink.clone();
        let config = config.clone();

        self.pool
            .get_or_create(key, fingerprint, || async move {
                let connection =
                    DiscordConnection::open(creds.token, api_base, &gateway_url, &config, sink)
                        .await?;
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

    fn to_envelope(
        &self,
        payload: &serde_json::Value,
        config: &PlatformConfig,
    ) -> PlatformResult<Vec<Envelope>> {
        // Discord events arrive over the gateway pre-split by dispatch kind
        let kind = payload.get("t").and_then(|v| v.as_str()).unwrap_or_default();
        let data = payload.get("d").unwrap_or(payload);
        Ok(dispatch_to_envelope(kind, data, &config.project_id, &config.id)
            .into_iter()
            .collect())
    }

    async fn connection_count(&self) -> usize {
        self.pool.len().await
    }

    async fn shutdown(&self) {
        self.pool.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intents_cover_required_events() {
        // Guilds, GuildMessages, DirectMessages, MessageContent
        assert_eq!(GATEWAY_INTENTS, 1 + 512 + 4096 + 32768);
    }

    #[test]
    fn test_message_create_to_envelope() {
        let payload = serde_json::json!({
            "id": "111222333",
            "channel_id": "987654321",
            "content": "hello",
            "author": {"id": "42", "username": "alice", "bot": false}
        });

        let envelope =
            dispatch_to_envelope("MESSAGE_CREATE", &payload, "proj-1", "cfg-1").unwrap();
        assert_eq!(envelope.channel, "discord");
        assert_eq!(envelope.thread_id.as_deref(), Some("987654321"));
        assert_eq!(envelope.user.provider_user_id, "42");
        assert_eq!(envelope.message.text.as_deref(), Some("hello"));
        assert_eq!(envelope.provider.event_id, "111222333");
    }

    #[test]
    fn test_bot_messages_are_skipped() {
        let payload = serde_json::json!({
            "id": "111",
            "channel_id": "987",
            "content": "beep",
            "author": {"id": "42", "username": "bot", "bot": true}
        });
        assert!(dispatch_to_envelope("MESSAGE_CREATE", &payload, "p", "c").is_none());
    }

    #[test]
    fn test_interaction_create_to_envelope() {
        let payload = serde_json::json!({
            "id": "555",
            "channel_id": "987",
            "member": {"user": {"id": "42", "username": "alice"}},
            "data": {"custom_id": "approve"}
        });

        let envelope =
            dispatch_to_envelope("INTERACTION_CREATE", &payload, "proj-1", "cfg-1").unwrap();
        let action = envelope.action.as_ref().unwrap();
        assert_eq!(action.kind, "button");
        assert_eq!(action.value, "approve");
    }

    #[test]
    fn test_unknown_dispatch_kinds_are_ignored() {
        let payload = serde_json::json!({"id": "1"});
        assert!(dispatch_to_envelope("TYPING_START", &payload, "p", "c").is_none());
    }

    #[test]
    fn test_capacity_guard() {
        assert!(DiscordProvider::ensure_capacity(0).is_ok());
        assert!(DiscordProvider::ensure_capacity(MAX_DISCORD_CONNECTIONS - 1).is_ok());
        let err = DiscordProvider::ensure_capacity(MAX_DISCORD_CONNECTIONS).unwrap_err();
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_discord_status(404, "Unknown Channel".into()),
            SendError::Permanent(_)
        ));
        assert!(matches!(
            classify_discord_status(429, "rate limited".into()),
            SendError::Transient(_)
        ));
        assert!(matches!(
            classify_discord_status(503, "unavailable".into()),
            SendError::Transient(_)
        ));
    }

    #[test]
    fn test_credentials_validation() {
        assert!(DiscordProvider::parse_credentials(&serde_json::json!({"token": "t"})).is_ok());
        assert!(DiscordProvider::parse_credentials(&serde_json::json!({"token": ""})).is_err());
    }
}
