//! WhatsApp adapter via the Evolution API
//!
//! Webhook-class adapter. Connection creation points Evolution's webhook at
//! `{base_url}/api/v1/webhooks/whatsapp-evo/{webhookToken}` subscribing to
//! QRCODE_UPDATED, CONNECTION_UPDATE, MESSAGES_UPSERT and SEND_MESSAGE.
//! Inbound CONNECTION_UPDATE events drive the three-state connection FSM
//! (close -> connecting -> open); QR codes are cached on the connection for
//! retrieval. Outbound text goes through `/message/sendText/{instance}`,
//! media through `/message/sendMedia/{instance}` with the mediatype derived
//! from the MIME type.
//!
//! All platform configs share the single Evolution instance name; instance
//! management is manual on the Evolution side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use gatekit_core::{ConnectionKey, Envelope, PlatformConfig, PlatformLifecycleEvent,
    PlatformLifecycleKind, ReplyPayload};

use crate::error::{PlatformError, PlatformResult, SendError, SendReceipt};
use crate::pool::{credentials_fingerprint, ConnectionPool};
use crate::spi::{
    Capability, ConnectionType, EnvelopeSink, PlatformConnection, PlatformProvider,
    ProviderDescriptor, WebhookRequest,
};

/// Shared Evolution instance name used by every platform config
pub const EVOLUTION_INSTANCE: &str = "gatekit";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const WEBHOOK_EVENTS: [&str; 4] = [
    "QRCODE_UPDATED",
    "CONNECTION_UPDATE",
    "MESSAGES_UPSERT",
    "SEND_MESSAGE",
];

#[derive(Debug, Clone, Deserialize)]
struct EvolutionCredentials {
    #[serde(rename = "evolutionApiUrl")]
    evolution_api_url: String,
    #[serde(rename = "evolutionApiKey")]
    evolution_api_key: String,
}

/// WhatsApp session state as reported by Evolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhatsAppState {
    Close,
    Connecting,
    Open,
}

impl WhatsAppState {
    fn from_str(state: &str) -> Option<Self> {
        match state {
            "close" => Some(Self::Close),
            "connecting" => Some(Self::Connecting),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}

/// WhatsApp Evolution provider
pub struct EvolutionProvider {
    /// Public gateway base URL, for webhook registration
    base_url: String,
    pool: ConnectionPool,
    sink: Arc<dyn EnvelopeSink>,
}

impl EvolutionProvider {
    pub fn new(base_url: impl Into<String>, sink: Arc<dyn EnvelopeSink>) -> Self {
        Self {
            base_url: base_url.into(),
            pool: ConnectionPool::new(),
            sink,
        }
    }

    fn parse_credentials(credentials: &serde_json::Value) -> PlatformResult<EvolutionCredentials> {
        let creds: EvolutionCredentials = serde_json::from_value(credentials.clone())
            .map_err(|e| {
                PlatformError::Credentials(format!("invalid Evolution credentials: {e}"))
            })?;
        if creds.evolution_api_url.is_empty() || creds.evolution_api_key.is_empty() {
            return Err(PlatformError::Credentials(
                "evolutionApiUrl and evolutionApiKey are required".into(),
            ));
        }
        Ok(creds)
    }
}

/// One live Evolution-backed WhatsApp connection
pub struct EvolutionConnection {
    api_url: String,
    api_key: String,
    http: reqwest::Client,
    state: RwLock<WhatsAppState>,
    qr_code: RwLock<Option<String>>,
}

impl EvolutionConnection {
    fn new(api_url: String, api_key: String) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Api(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            http,
            state: RwLock::new(WhatsAppState::Close),
            qr_code: RwLock::new(None),
        })
    }

    async fn configure_webhook(&self, callback_url: &str) -> PlatformResult<()> {
        let response = self
            .http
            .post(format!("{}/webhook/set/{}", self.api_url, EVOLUTION_INSTANCE))
            .header("apikey", &self.api_key)
            .json(&json!({
                "webhook": {
                    "enabled": true,
                    "url": callback_url,
                    "events": WEBHOOK_EVENTS,
                }
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Api(format!("webhook configuration failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "webhook configuration rejected: HTTP {}",
                response.status()
            )));
        }
        debug!(url = callback_url, "evolution webhook configured");
        Ok(())
    }

    /// Current FSM state
    pub async fn state(&self) -> WhatsAppState {
        *self.state.read().await
    }

    /// Last QR code pushed by Evolution, for pairing flows
    pub async fn qr_code(&self) -> Option<String> {
        self.qr_code.read().await.clone()
    }

    async fn apply_connection_update(&self, state: &str) {
        let Some(next) = WhatsAppState::from_str(state) else {
            warn!(state, "unknown whatsapp connection state");
            return;
        };
        let mut current = self.state.write().await;
        if *current != next {
            info!(from = ?*current, to = ?next, "whatsapp connection state changed");
            *current = next;
        }
        // A fresh open session no longer needs the pairing QR
        if next == WhatsAppState::Open {
            *self.qr_code.write().await = None;
        }
    }

    async fn cache_qr_code(&self, qr: String) {
        *self.qr_code.write().await = Some(qr);
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, SendError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .header("apikey", &self.api_key)
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
            return Err(classify_evolution_status(status, body));
        }
        response
            .json()
            .await
            .map_err(|e| SendError::transient(format!("invalid API response: {e}")))
    }
}

/// Evolution media type for an attachment MIME type
pub fn media_type_for_mime(mime: Option<&str>) -> &'static str {
    match mime {
        Some(m) if m.starts_with("image/") => "image",
        Some(m) if m.starts_with("video/") => "video",
        Some(m) if m.starts_with("audio/") => "audio",
        _ => "document",
    }
}

fn classify_evolution_status(status: u16, body: String) -> SendError {
    match status {
        400 | 401 | 403 | 404 => SendError::Permanent(body),
        429 => SendError::Transient(body),
        s if s >= 500 => SendError::Transient(body),
        _ => SendError::Unclassified(body),
    }
}

#[async_trait]
impl PlatformConnection for EvolutionConnection {
    async fn send_message(
        &self,
        _envelope: &Envelope,
        reply: &ReplyPayload,
    ) -> Result<SendReceipt, SendError> {
        let number = reply
            .thread_id
            .as_deref()
            .ok_or_else(|| SendError::permanent("target number not provided"))?;

        if let Some(attachment) = reply.attachments.first() {
            let media = attachment
                .url
                .clone()
                .or_else(|| attachment.data.clone())
                .ok_or_else(|| SendError::permanent("attachment media not provided"))?;
            let body = json!({
                "number": number,
                "mediatype": media_type_for_mime(attachment.mime_type.as_deref()),
                "media": media,
                "caption": attachment.caption.as_deref().or(reply.text.as_deref()),
                "fileName": attachment.filename,
            });
            let result = self
                .post(&format!("/message/sendMedia/{EVOLUTION_INSTANCE}"), body)
                .await?;
            return Ok(SendReceipt {
                provider_message_id: result
                    .pointer("/key/id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            });
        }

        let text = reply
            .text
            .as_deref()
            .ok_or_else(|| SendError::permanent("message text not provided"))?;
        let result = self
            .post(
                &format!("/message/sendText/{EVOLUTION_INSTANCE}"),
                json!({ "number": number, "text": text }),
            )
            .await?;
        Ok(SendReceipt {
            provider_message_id: result
                .pointer("/key/id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
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
impl PlatformProvider for EvolutionProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "whatsapp-evo",
            display_name: "WhatsApp (Evolution API)",
            connection_type: ConnectionType::Webhook,
            capabilities: vec![
                Capability::SendMessage,
                Capability::ReceiveMessage,
                Capability::Attachments,
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
        let callback_url = format!(
            "{}/api/v1/webhooks/whatsapp-evo/{}",
            self.base_url, config.webhook_token
        );

        self.pool
            .get_or_create(key, fingerprint, || async move {
                let connection =
                    EvolutionConnection::new(creds.evolution_api_url, creds.evolution_api_key)?;
                connection.configure_webhook(&callback_url).await?;
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
        if payload.get("event").and_then(|v| v.as_str()) != Some("MESSAGES_UPSERT") {
            return Ok(Vec::new());
        }
        let data = payload
            .get("data")
            .ok_or_else(|| PlatformError::Parse("MESSAGES_UPSERT missing data".into()))?;

        // The bot's own sends echo back with fromMe=true
        if data.pointer("/key/fromMe").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Ok(Vec::new());
        }

        let remote_jid = data
            .pointer("/key/remoteJid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::Parse("key.remoteJid missing".into()))?;
        let message_id = data
            .pointer("/key/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::Parse("key.id missing".into()))?;
        let text = data
            .pointer("/message/conversation")
            .or_else(|| data.pointer("/message/extendedTextMessage/text"))
            .and_then(|v| v.as_str());
        let Some(text) = text else {
            // Media-only and system messages are ignored
            return Ok(Vec::new());
        };
        let display = data
            .get("pushName")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        // remoteJid looks like "5511999999999@s.whatsapp.net"
        let user_id = remote_jid.split('@').next().unwrap_or(remote_jid);

        let envelope = Envelope::builder("whatsapp-evo", &config.project_id)
            .platform_config_id(&config.id)
            .thread_id(remote_jid)
            .user(user_id, display)
            .text(text)
            .provider(message_id, payload.clone())
            .build()
            .map_err(|e| PlatformError::Parse(e.to_string()))?;
        Ok(vec![envelope])
    }

    fn webhook_path(&self) -> Option<String> {
        Some("/api/v1/webhooks/whatsapp-evo/:webhookToken".to_string())
    }

    async fn handle_webhook(&self, request: WebhookRequest) -> PlatformResult<serde_json::Value> {
        let event = request
            .body
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        match event {
            "QRCODE_UPDATED" => {
                if let Some(qr) = request
                    .body
                    .pointer("/data/qrcode/base64")
                    .and_then(|v| v.as_str())
                {
                    if let Some(connection) =
                        self.pool.get(&request.config.connection_key()).await
                    {
                        if let Some(evo) =
                            connection.as_any().downcast_ref::<EvolutionConnection>()
                        {
                            evo.cache_qr_code(qr.to_string()).await;
                        }
                    }
                }
            }
            "CONNECTION_UPDATE" => {
                if let Some(state) = request
                    .body
                    .pointer("/data/state")
                    .and_then(|v| v.as_str())
                {
                    if let Some(connection) =
                        self.pool.get(&request.config.connection_key()).await
                    {
                        if let Some(evo) =
                            connection.as_any().downcast_ref::<EvolutionConnection>()
                        {
                            evo.apply_connection_update(state).await;
                        }
                    }
                }
            }
            "MESSAGES_UPSERT" => {
                for envelope in self.to_envelope(&request.body, &request.config)? {
                    self.sink.publish(envelope).await;
                }
            }
            "SEND_MESSAGE" => {
                debug!("evolution send acknowledgement received");
            }
            other => {
                debug!(event = other, "ignoring unsubscribed evolution event");
            }
        }
        Ok(json!({ "status": "ok" }))
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
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct RecordingSink {
        envelopes: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl EnvelopeSink for RecordingSink {
        async fn publish(&self, envelope: Envelope) {
            self.envelopes.lock().await.push(envelope);
        }
    }

    fn test_config() -> PlatformConfig {
        let now = Utc::now();
        PlatformConfig {
            id: "cfg-wa".into(),
            project_id: "proj-1".into(),
            platform: "whatsapp-evo".into(),
            credentials_encrypted: "sealed".into(),
            webhook_token: "3f6f0b2e-1111-4222-8333-444455556666".into(),
            is_active: true,
            test_mode: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn provider() -> EvolutionProvider {
        EvolutionProvider::new(
            "https://gate.example.com",
            Arc::new(RecordingSink {
                envelopes: Mutex::new(Vec::new()),
            }),
        )
    }

    #[test]
    fn test_messages_upsert_to_envelope() {
        let payload = serde_json::json!({
            "event": "MESSAGES_UPSERT",
            "instance": "gatekit",
            "data": {
                "key": {"remoteJid": "5511999999999@s.whatsapp.net", "fromMe": false, "id": "ABCD"},
                "pushName": "Alice",
                "message": {"conversation": "oi"}
            }
        });

        let envelopes = provider().to_envelope(&payload, &test_config()).unwrap();
        assert_eq!(envelopes.len(), 1);
        let envelope = &envelopes[0];
        assert_eq!(envelope.channel, "whatsapp-evo");
        assert_eq!(envelope.user.provider_user_id, "5511999999999");
        assert_eq!(envelope.user.display.as_deref(), Some("Alice"));
        assert_eq!(envelope.thread_id.as_deref(), Some("5511999999999@s.whatsapp.net"));
        assert_eq!(envelope.message.text.as_deref(), Some("oi"));
        assert_eq!(envelope.provider.event_id, "ABCD");
    }

    #[test]
    fn test_own_messages_are_skipped() {
        let payload = serde_json::json!({
            "event": "MESSAGES_UPSERT",
            "data": {
                "key": {"remoteJid": "551199@s.whatsapp.net", "fromMe": true, "id": "X"},
                "message": {"conversation": "echo"}
            }
        });
        assert!(provider().to_envelope(&payload, &test_config()).unwrap().is_empty());
    }

    #[test]
    fn test_extended_text_message() {
        let payload = serde_json::json!({
            "event": "MESSAGES_UPSERT",
            "data": {
                "key": {"remoteJid": "551199@s.whatsapp.net", "fromMe": false, "id": "X"},
                "message": {"extendedTextMessage": {"text": "quoted reply"}}
            }
        });
        let envelopes = provider().to_envelope(&payload, &test_config()).unwrap();
        assert_eq!(envelopes[0].message.text.as_deref(), Some("quoted reply"));
    }

    #[test]
    fn test_other_events_make_no_envelopes() {
        let payload = serde_json::json!({"event": "CONNECTION_UPDATE", "data": {"state": "open"}});
        assert!(provider().to_envelope(&payload, &test_config()).unwrap().is_empty());
    }

    #[test]
    fn test_media_type_mapping() {
        assert_eq!(media_type_for_mime(Some("image/png")), "image");
        assert_eq!(media_type_for_mime(Some("video/mp4")), "video");
        assert_eq!(media_type_for_mime(Some("audio/ogg")), "audio");
        assert_eq!(media_type_for_mime(Some("application/pdf")), "document");
        assert_eq!(media_type_for_mime(None), "document");
    }

    #[tokio::test]
    async fn test_connection_state_machine() {
        let connection = EvolutionConnection::new("https://evo.local".into(), "key".into()).unwrap();
        assert_eq!(connection.state().await, WhatsAppState::Close);

        connection.apply_connection_update("connecting").await;
        assert_eq!(connection.state().await, WhatsAppState::Connecting);

        connection.cache_qr_code("qr-base64".into()).await;
        assert_eq!(connection.qr_code().await.as_deref(), Some("qr-base64"));

        connection.apply_connection_update("open").await;
        assert_eq!(connection.state().await, WhatsAppState::Open);
        // Pairing QR is dropped once the session opens
        assert!(connection.qr_code().await.is_none());

        connection.apply_connection_update("nonsense").await;
        assert_eq!(connection.state().await, WhatsAppState::Open);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_evolution_status(404, "instance not found".into()),
            SendError::Permanent(_)
        ));
        assert!(matches!(
            classify_evolution_status(500, "boom".into()),
            SendError::Transient(_)
        ));
    }

    #[test]
    fn test_credentials_validation() {
        let ok = serde_json::json!({"evolutionApiUrl": "https://evo", "evolutionApiKey": "k"});
        assert!(EvolutionProvider::parse_credentials(&ok).is_ok());
        let missing = serde_json::json!({"evolutionApiUrl": "https://evo"});
        assert!(EvolutionProvider::parse_credentials(&missing).is_err());
    }
}
