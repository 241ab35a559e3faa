//! Integration tests for the delivery pipelines
//!
//! Covers:
//! - outbound fan-out with mixed success / permanent failure across targets
//! - transient failures retrying through the queue backoff
//! - HMAC-signed subscriber delivery with failures before success

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use gatekit_core::{
    ConnectionKey, Envelope, EventKind, EventRecord, PlatformConfig, Project, ReplyPayload,
    SentStatus, Webhook, WebhookDeliveryStatus,
};
use gatekit_crypto::{verify_signature, CredentialCipher};
use gatekit_pipeline::{
    DeliveryConfig, EventBus, JobState, OutboundConfig, OutboundPipeline, SendRequest,
    WebhookDispatcher,
};
use gatekit_pipeline::subscribers::EventDispatcher;
use gatekit_platforms::{
    Capability, ConnectionType, PlatformConnection, PlatformProvider, PlatformRegistry,
    PlatformResult, ProviderDescriptor, SendError, SendReceipt,
};
use gatekit_store::{MemoryStore, MessageStore, PlatformConfigStore, Store, WebhookStore};

// ---------------------------------------------------------------------------
// Mock platform
// ---------------------------------------------------------------------------

struct MockConnection {
    transient_failures_left: Arc<AtomicUsize>,
}

#[async_trait]
impl PlatformConnection for MockConnection {
    async fn send_message(
        &self,
        _envelope: &Envelope,
        reply: &ReplyPayload,
    ) -> Result<SendReceipt, SendError> {
        let target = reply.thread_id.as_deref().unwrap_or_default();
        if target.starts_with("perm") {
            return Err(SendError::permanent("chat not found"));
        }
        if self.transient_failures_left.load(Ordering::SeqCst) > 0 {
            self.transient_failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(SendError::transient("connection reset"));
        }
        Ok(SendReceipt {
            provider_message_id: Some(format!("remote-{target}")),
        })
    }

    async fn close(&self) {}

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct MockProvider {
    pool: gatekit_platforms::ConnectionPool,
    transient_failures: Arc<AtomicUsize>,
}

impl MockProvider {
    fn new(transient_failures: usize) -> Self {
        Self {
            pool: gatekit_platforms::ConnectionPool::new(),
            transient_failures: Arc::new(AtomicUsize::new(transient_failures)),
        }
    }
}

#[async_trait]
impl PlatformProvider for MockProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "mock",
            display_name: "Mock",
            connection_type: ConnectionType::Webhook,
            capabilities: vec![Capability::SendMessage],
        }
    }

    async fn create_connection(
        &self,
        key: &ConnectionKey,
        _config: &PlatformConfig,
        credentials: &serde_json::Value,
    ) -> PlatformResult<Arc<dyn PlatformConnection>> {
        let fingerprint = gatekit_platforms::pool::credentials_fingerprint(credentials);
        let failures = self.transient_failures.clone();
        self.pool
            .get_or_create(key, fingerprint, || async move {
                Ok(Arc::new(MockConnection {
                    transient_failures_left: failures,
                }) as Arc<dyn PlatformConnection>)
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
        _payload: &serde_json::Value,
        _config: &PlatformConfig,
    ) -> PlatformResult<Vec<Envelope>> {
        Ok(Vec::new())
    }

    async fn connection_count(&self) -> usize {
        self.pool.len().await
    }

    async fn shutdown(&self) {
        self.pool.drain().await;
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    events: Mutex<Vec<EventRecord>>,
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: EventRecord) {
        self.events.lock().await.push(event);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_project(store_id: &str) -> Project {
    let now = Utc::now();
    Project {
        id: store_id.to_string(),
        slug: "demo".to_string(),
        name: "Demo".to_string(),
        environment: gatekit_core::Environment::Development,
        owner_id: "user-1".to_string(),
        is_default: true,
        created_at: now,
        updated_at: now,
    }
}

async fn insert_mock_config(
    store: &MemoryStore,
    cipher: &CredentialCipher,
    id: &str,
    active: bool,
) {
    let now = Utc::now();
    let sealed = cipher.encrypt(&serde_json::json!({"token": "t"})).unwrap();
    store
        .insert_platform(PlatformConfig {
            id: id.to_string(),
            project_id: "proj-1".to_string(),
            platform: "mock".to_string(),
            credentials_encrypted: sealed,
            webhook_token: Uuid::new_v4().to_string(),
            is_active: active,
            test_mode: false,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

fn fast_outbound() -> OutboundConfig {
    OutboundConfig {
        workers: 2,
        attempts: 3,
        backoff_base: Duration::from_millis(10),
    }
}

async fn wait_for_terminal(
    pipeline: &OutboundPipeline,
    job_id: &str,
) -> gatekit_pipeline::JobStatus {
    for _ in 0..500 {
        if let Some(status) = pipeline.job_status(job_id) {
            if matches!(status.state, JobState::Completed | JobState::Failed) {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

fn send_request(targets: &[&str]) -> SendRequest {
    serde_json::from_value(serde_json::json!({
        "targets": targets,
        "content": {"text": "hello"}
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// Outbound fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fanout_all_targets_succeed() {
    let store = Arc::new(MemoryStore::new());
    let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
    insert_mock_config(&store, &cipher, "cfg-1", true).await;

    let registry = Arc::new(PlatformRegistry::new(store.clone(), cipher));
    registry.register(Arc::new(MockProvider::new(0)));
    let events = Arc::new(RecordingDispatcher::default());
    let pipeline = OutboundPipeline::start(
        store.clone() as Arc<dyn Store>,
        registry,
        events.clone(),
        fast_outbound(),
    );

    let response = pipeline
        .submit(&test_project("proj-1"), send_request(&["cfg-1:user:a", "cfg-1:user:b"]))
        .await
        .unwrap();
    assert_eq!(response.status, "queued");
    assert_eq!(response.targets, 2);

    let status = wait_for_terminal(&pipeline, &response.job_id).await;
    assert_eq!(status.state, JobState::Completed);

    let rows = store.sent_by_job(&response.job_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == SentStatus::Sent));
    assert!(rows.iter().all(|r| r.provider_message_id.is_some()));

    let events = events.events.lock().await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event == EventKind::MessageSent));
}

#[tokio::test]
async fn test_fanout_with_missing_config_aborts_permanently() {
    let store = Arc::new(MemoryStore::new());
    let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
    insert_mock_config(&store, &cipher, "cfg-1", true).await;

    let registry = Arc::new(PlatformRegistry::new(store.clone(), cipher));
    registry.register(Arc::new(MockProvider::new(0)));
    let events = Arc::new(RecordingDispatcher::default());
    let pipeline = OutboundPipeline::start(
        store.clone() as Arc<dyn Store>,
        registry,
        events.clone(),
        fast_outbound(),
    );

    // Second target references a deleted config
    let response = pipeline
        .submit(
            &test_project("proj-1"),
            send_request(&["cfg-1:user:a", "cfg-deleted:user:b"]),
        )
        .await
        .unwrap();

    let status = wait_for_terminal(&pipeline, &response.job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.data.error.unwrap().contains("not found"));
    // Permanent failures do not consume retries
    assert_eq!(status.attempts_made, 1);

    let rows = store.sent_by_job(&response.job_id).await.unwrap();
    let sent: Vec<_> = rows.iter().filter(|r| r.status == SentStatus::Sent).collect();
    let failed: Vec<_> = rows.iter().filter(|r| r.status == SentStatus::Failed).collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error_message.as_deref().unwrap().contains("not found"));

    let events = events.events.lock().await;
    assert!(events.iter().any(|e| e.event == EventKind::MessageSent));
    assert!(events.iter().any(|e| e.event == EventKind::MessageFailed));
}

#[tokio::test]
async fn test_inactive_config_is_permanent() {
    let store = Arc::new(MemoryStore::new());
    let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
    insert_mock_config(&store, &cipher, "cfg-off", false).await;

    let registry = Arc::new(PlatformRegistry::new(store.clone(), cipher));
    registry.register(Arc::new(MockProvider::new(0)));
    let events = Arc::new(RecordingDispatcher::default());
    let pipeline = OutboundPipeline::start(
        store.clone() as Arc<dyn Store>,
        registry,
        events,
        fast_outbound(),
    );

    let response = pipeline
        .submit(&test_project("proj-1"), send_request(&["cfg-off:user:a"]))
        .await
        .unwrap();

    let status = wait_for_terminal(&pipeline, &response.job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.data.error.unwrap().contains("disabled"));
}

#[tokio::test]
async fn test_transient_failure_retries_until_success() {
    let store = Arc::new(MemoryStore::new());
    let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
    insert_mock_config(&store, &cipher, "cfg-1", true).await;

    let registry = Arc::new(PlatformRegistry::new(store.clone(), cipher));
    // First send attempt fails with a transient error, second succeeds
    registry.register(Arc::new(MockProvider::new(1)));
    let events = Arc::new(RecordingDispatcher::default());
    let pipeline = OutboundPipeline::start(
        store.clone() as Arc<dyn Store>,
        registry,
        events,
        fast_outbound(),
    );

    let response = pipeline
        .submit(&test_project("proj-1"), send_request(&["cfg-1:user:a"]))
        .await
        .unwrap();

    let status = wait_for_terminal(&pipeline, &response.job_id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.attempts_made, 2);
}

#[tokio::test]
async fn test_validation_rejects_bad_requests() {
    let store = Arc::new(MemoryStore::new());
    let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
    let registry = Arc::new(PlatformRegistry::new(store.clone(), cipher));
    let events = Arc::new(RecordingDispatcher::default());
    let pipeline = OutboundPipeline::start(
        store.clone() as Arc<dyn Store>,
        registry,
        events,
        fast_outbound(),
    );
    let project = test_project("proj-1");

    // Empty targets
    let request = send_request(&[]);
    assert!(pipeline.submit(&project, request).await.is_err());

    // Malformed target
    let request = send_request(&["a:b"]);
    assert!(pipeline.submit(&project, request).await.is_err());

    // Content with nothing to send
    let request: SendRequest = serde_json::from_value(serde_json::json!({
        "targets": ["cfg-1:user:a"],
        "content": {"buttons": [{"text": "hi"}]}
    }))
    .unwrap();
    assert!(pipeline.submit(&project, request).await.is_err());

    // No rows or jobs were created along the way
    assert!(store.sent_by_job("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_creates_fresh_job_and_rows() {
    let store = Arc::new(MemoryStore::new());
    let cipher = CredentialCipher::new(&"00".repeat(32)).unwrap();
    insert_mock_config(&store, &cipher, "cfg-1", true).await;

    let registry = Arc::new(PlatformRegistry::new(store.clone(), cipher));
    registry.register(Arc::new(MockProvider::new(0)));
    let events = Arc::new(RecordingDispatcher::default());
    let pipeline = OutboundPipeline::start(
        store.clone() as Arc<dyn Store>,
        registry,
        events,
        fast_outbound(),
    );

    let first = pipeline
        .submit(&test_project("proj-1"), send_request(&["cfg-1:user:a"]))
        .await
        .unwrap();
    wait_for_terminal(&pipeline, &first.job_id).await;

    let second = pipeline.retry(&first.job_id).await.unwrap();
    assert_ne!(first.job_id, second.job_id);
    wait_for_terminal(&pipeline, &second.job_id).await;

    // Original rows untouched, fresh rows for the retry
    assert_eq!(store.sent_by_job(&first.job_id).await.unwrap().len(), 1);
    assert_eq!(store.sent_by_job(&second.job_id).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Subscriber delivery
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct ReceiverState {
    hits: Arc<AtomicUsize>,
    /// (body bytes, signature header) per request
    requests: Arc<Mutex<Vec<(Vec<u8>, String)>>>,
    /// Failures to serve before returning 200
    failures: Arc<AtomicUsize>,
}

async fn receiver_handler(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    let signature = headers
        .get("X-GateKit-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.requests.lock().await.push((body.to_vec(), signature));
    state.hits.fetch_add(1, Ordering::SeqCst);

    if state.failures.load(Ordering::SeqCst) > 0 {
        state.failures.fetch_sub(1, Ordering::SeqCst);
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn start_receiver(failures: usize) -> (SocketAddr, ReceiverState) {
    let state = ReceiverState {
        failures: Arc::new(AtomicUsize::new(failures)),
        ..Default::default()
    };
    let app = Router::new()
        .route("/hook", post(receiver_handler))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn register_webhook(store: &MemoryStore, url: String, secret: &str, events: &[&str]) -> Webhook {
    store
        .insert_webhook(Webhook {
            id: Uuid::new_v4().to_string(),
            project_id: "proj-1".to_string(),
            name: "test subscriber".to_string(),
            url,
            events: events.iter().map(|e| e.to_string()).collect(),
            secret: secret.to_string(),
            is_active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        workers: 2,
        attempts: 5,
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_millis(100),
        jitter: 0.0,
        timeout: Duration::from_secs(2),
    }
}

async fn wait_for_deliveries(
    store: &MemoryStore,
    webhook_id: &str,
    terminal: usize,
) -> Vec<gatekit_core::WebhookDelivery> {
    for _ in 0..500 {
        let deliveries = store
            .list_deliveries(webhook_id, &Default::default(), Default::default())
            .await
            .unwrap();
        let done = deliveries
            .iter()
            .filter(|d| d.status != WebhookDeliveryStatus::Pending)
            .count();
        if done >= terminal {
            return deliveries;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("deliveries never reached a terminal state");
}

#[tokio::test]
async fn test_delivery_signs_body_and_retries_to_success() {
    let (addr, receiver) = start_receiver(2).await;
    let store = Arc::new(MemoryStore::new());
    let webhook = register_webhook(
        &store,
        format!("http://{addr}/hook"),
        "secret-S",
        &["message.received"],
    )
    .await;

    let dispatcher = WebhookDispatcher::start(store.clone() as Arc<dyn Store>, fast_delivery());
    dispatcher
        .dispatch(EventRecord::new(
            EventKind::MessageReceived,
            "proj-1",
            serde_json::json!({"message_text": "hi"}),
        ))
        .await;

    let deliveries = wait_for_deliveries(&store, &webhook.id, 1).await;
    assert_eq!(deliveries.len(), 1);
    let delivery = &deliveries[0];
    assert_eq!(delivery.status, WebhookDeliveryStatus::Success);
    // 500, 500, then 200
    assert_eq!(delivery.attempt_count, 3);
    assert_eq!(delivery.response_code, Some(200));
    assert_eq!(receiver.hits.load(Ordering::SeqCst), 3);

    // Every request carried a valid signature over the exact body bytes
    let requests = receiver.requests.lock().await;
    for (body, signature) in requests.iter() {
        assert!(verify_signature("secret-S", body, signature));
    }

    // The body is the event-shaped payload
    let parsed: serde_json::Value = serde_json::from_slice(&requests[0].0).unwrap();
    assert_eq!(parsed["event"], "message.received");
    assert_eq!(parsed["project_id"], "proj-1");
    assert_eq!(parsed["data"]["message_text"], "hi");
}

#[tokio::test]
async fn test_delivery_fails_after_max_attempts() {
    let (addr, receiver) = start_receiver(usize::MAX).await;
    let store = Arc::new(MemoryStore::new());
    let webhook = register_webhook(
        &store,
        format!("http://{addr}/hook"),
        "s",
        &["message.failed"],
    )
    .await;

    let dispatcher = WebhookDispatcher::start(store.clone() as Arc<dyn Store>, fast_delivery());
    dispatcher
        .dispatch(EventRecord::new(
            EventKind::MessageFailed,
            "proj-1",
            serde_json::json!({}),
        ))
        .await;

    let deliveries = wait_for_deliveries(&store, &webhook.id, 1).await;
    assert_eq!(deliveries[0].status, WebhookDeliveryStatus::Failed);
    assert_eq!(deliveries[0].attempt_count, 5);
    assert_eq!(receiver.hits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_events_only_reach_matching_subscribers() {
    let (addr, _receiver) = start_receiver(0).await;
    let store = Arc::new(MemoryStore::new());
    let matching = register_webhook(
        &store,
        format!("http://{addr}/hook"),
        "s",
        &["message.received"],
    )
    .await;
    let other = register_webhook(
        &store,
        format!("http://{addr}/hook"),
        "s",
        &["reaction.added"],
    )
    .await;

    let dispatcher = WebhookDispatcher::start(store.clone() as Arc<dyn Store>, fast_delivery());
    dispatcher
        .dispatch(EventRecord::new(
            EventKind::MessageReceived,
            "proj-1",
            serde_json::json!({}),
        ))
        .await;

    wait_for_deliveries(&store, &matching.id, 1).await;
    let unmatched = store
        .list_deliveries(&other.id, &Default::default(), Default::default())
        .await
        .unwrap();
    assert!(unmatched.is_empty());
}

// ---------------------------------------------------------------------------
// Bus-to-inbound wiring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bus_to_inbound_processing() {
    use gatekit_platforms::EnvelopeSink;

    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(RecordingDispatcher::default());
    let bus = EventBus::new();
    let processor = gatekit_pipeline::InboundProcessor::new(
        store.clone() as Arc<dyn Store>,
        events.clone(),
    );
    processor.start(&bus, 4);

    let envelope = Envelope::builder("telegram", "proj-1")
        .platform_config_id("cfg-1")
        .thread_id("100")
        .user("7", Some("alice".into()))
        .text("via the bus")
        .provider("evt-77", serde_json::Value::Null)
        .build()
        .unwrap();
    bus.publish(envelope).await;

    for _ in 0..500 {
        let rows = store
            .list_received("proj-1", &Default::default(), Default::default())
            .await
            .unwrap();
        if !rows.is_empty() {
            assert_eq!(rows[0].message_text.as_deref(), Some("via the bus"));
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("envelope never reached the store");
}
