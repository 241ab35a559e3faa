//! Inbound event pipeline
//!
//! Subscribes to the event bus and, per envelope: persists the message or
//! reaction, resolves the sender's identity (best-effort), and emits the
//! matching subscriber event. Envelopes are hashed onto shard workers by
//! `(platform_config_id, thread_id)` so a single chat processes in arrival
//! order while different chats run in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use gatekit_core::{
    Envelope, EventKind, EventRecord, MessageKind, ReactionKind, ReceivedMessage,
    ReceivedReaction,
};
use gatekit_store::{IdentityResolver, MessageStore, ReactionStore, Store, StoreError};

use crate::bus::EventBus;
use crate::subscribers::EventDispatcher;

const SHARD_QUEUE_DEPTH: usize = 256;

/// Consumes envelopes and turns them into rows and subscriber events
pub struct InboundProcessor {
    store: Arc<dyn Store>,
    resolver: IdentityResolver<dyn Store>,
    events: Arc<dyn EventDispatcher>,
}

impl InboundProcessor {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            resolver: IdentityResolver::new(store.clone()),
            store,
            events,
        })
    }

    /// Attach to the bus: one router task fans envelopes out to `shards`
    /// ordered workers.
    pub fn start(self: Arc<Self>, bus: &EventBus, shards: usize) {
        let shards = shards.max(1);
        let mut senders = Vec::with_capacity(shards);
        for shard_id in 0..shards {
            let (tx, mut rx) = mpsc::channel::<Envelope>(SHARD_QUEUE_DEPTH);
            senders.push(tx);
            let processor = self.clone();
            tokio::spawn(async move {
                debug!(shard_id, "inbound shard worker started");
                while let Some(envelope) = rx.recv().await {
                    processor.process(envelope).await;
                }
            });
        }

        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        let shard = shard_for(&envelope, senders.len());
                        if senders[shard].send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "inbound processor lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("inbound router stopped");
        });
    }

    /// Process one envelope. Public so ingest can also be driven directly.
    pub async fn process(&self, envelope: Envelope) {
        if envelope.platform_config_id.is_empty() {
            warn!(envelope = %envelope.id, "envelope without platform config, dropping");
            return;
        }

        let mut persisted_message = None;
        if envelope.message.text.is_some() || envelope.action.is_some() {
            match self.persist_message(&envelope).await {
                Ok(row) => persisted_message = Some(row),
                Err(StoreError::Duplicate { .. }) => {
                    // Webhook redelivery; the first copy already went through
                    debug!(
                        event_id = %envelope.provider.event_id,
                        "duplicate inbound message swallowed"
                    );
                    return;
                }
                Err(e) => {
                    warn!("failed to persist inbound message: {e}");
                    return;
                }
            }
        }

        let mut persisted_reaction = None;
        if let Some(reaction) = &envelope.reaction {
            match self.persist_reaction(&envelope, reaction.emoji.clone(), reaction.kind).await {
                Ok(row) => persisted_reaction = Some(row),
                Err(e) => {
                    warn!("failed to persist reaction: {e}");
                    return;
                }
            }
        }

        // Identity resolution is best-effort; ingest never fails on it
        if let Err(e) = self
            .resolver
            .resolve(
                &envelope.project_id,
                &envelope.platform_config_id,
                &envelope.channel,
                &envelope.user.provider_user_id,
                envelope.user.display.as_deref(),
            )
            .await
        {
            debug!("identity resolution failed: {e}");
        }

        // One subscriber event per envelope, most specific kind first
        let (kind, data) = if let Some(row) = &persisted_reaction {
            let kind = match row.reaction_kind {
                ReactionKind::Added => EventKind::ReactionAdded,
                ReactionKind::Removed => EventKind::ReactionRemoved,
            };
            (kind, serde_json::to_value(row).unwrap_or(serde_json::Value::Null))
        } else if let Some(row) = &persisted_message {
            let kind = if envelope.action.is_some() {
                EventKind::ButtonClicked
            } else {
                EventKind::MessageReceived
            };
            (kind, serde_json::to_value(row).unwrap_or(serde_json::Value::Null))
        } else {
            return;
        };

        self.events
            .dispatch(EventRecord::new(kind, &envelope.project_id, data))
            .await;
    }

    async fn persist_message(&self, envelope: &Envelope) -> Result<ReceivedMessage, StoreError> {
        let kind = if envelope.action.is_some() {
            MessageKind::Callback
        } else {
            MessageKind::Text
        };
        self.store
            .insert_received(ReceivedMessage {
                id: Uuid::new_v4().to_string(),
                project_id: envelope.project_id.clone(),
                platform_config_id: envelope.platform_config_id.clone(),
                platform: envelope.channel.clone(),
                provider_message_id: envelope.provider.event_id.clone(),
                provider_chat_id: envelope.thread_id.clone().unwrap_or_default(),
                provider_user_id: envelope.user.provider_user_id.clone(),
                user_display: envelope.user.display.clone(),
                message_text: envelope.message.text.clone(),
                message_kind: kind,
                raw_data: envelope.provider.raw.clone(),
                received_at: Utc::now(),
            })
            .await
    }

    async fn persist_reaction(
        &self,
        envelope: &Envelope,
        emoji: String,
        kind: ReactionKind,
    ) -> Result<ReceivedReaction, StoreError> {
        self.store
            .insert_reaction(ReceivedReaction {
                id: Uuid::new_v4().to_string(),
                project_id: envelope.project_id.clone(),
                platform_config_id: envelope.platform_config_id.clone(),
                provider_message_id: envelope.provider.event_id.clone(),
                provider_user_id: envelope.user.provider_user_id.clone(),
                user_display: envelope.user.display.clone(),
                emoji,
                reaction_kind: kind,
                received_at: Utc::now(),
            })
            .await
    }
}

/// Stable shard assignment for a thread
fn shard_for(envelope: &Envelope, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    envelope.platform_config_id.hash(&mut hasher);
    envelope.thread_id.hash(&mut hasher);
    (hasher.finish() as usize) % shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use gatekit_core::Pagination;
    use gatekit_store::{MemoryStore, MessageStore, ReactionStore, ReceivedMessageFilter};

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

    fn message_envelope(event_id: &str, text: &str) -> Envelope {
        Envelope::builder("telegram", "proj-1")
            .platform_config_id("cfg-1")
            .thread_id("100")
            .user("7", Some("alice".into()))
            .text(text)
            .provider(event_id, serde_json::json!({"message_id": 42}))
            .build()
            .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<RecordingDispatcher>, Arc<InboundProcessor>) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = InboundProcessor::new(store.clone(), dispatcher.clone());
        (store, dispatcher, processor)
    }

    #[tokio::test]
    async fn test_message_is_persisted_and_emitted() {
        let (store, dispatcher, processor) = setup();
        processor.process(message_envelope("42", "hi")).await;

        let rows = store
            .list_received("proj-1", &ReceivedMessageFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provider_message_id, "42");
        assert_eq!(rows[0].provider_chat_id, "100");
        assert_eq!(rows[0].message_text.as_deref(), Some("hi"));
        assert_eq!(rows[0].message_kind, MessageKind::Text);

        let events = dispatcher.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EventKind::MessageReceived);
    }

    #[tokio::test]
    async fn test_duplicate_message_swallowed_without_second_event() {
        let (store, dispatcher, processor) = setup();
        processor.process(message_envelope("42", "hi")).await;
        processor.process(message_envelope("42", "hi")).await;

        let rows = store
            .list_received("proj-1", &ReceivedMessageFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(dispatcher.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_button_click_emits_button_clicked() {
        let (store, dispatcher, processor) = setup();
        let envelope = Envelope::builder("telegram", "proj-1")
            .platform_config_id("cfg-1")
            .thread_id("100")
            .user("7", None)
            .action("button", "approve")
            .provider("cb-1", serde_json::Value::Null)
            .build()
            .unwrap();
        processor.process(envelope).await;

        let rows = store
            .list_received("proj-1", &ReceivedMessageFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(rows[0].message_kind, MessageKind::Callback);

        let events = dispatcher.events.lock().await;
        assert_eq!(events[0].event, EventKind::ButtonClicked);
    }

    #[tokio::test]
    async fn test_reaction_events_round_trip() {
        let (store, dispatcher, processor) = setup();
        for kind in [ReactionKind::Added, ReactionKind::Removed] {
            let envelope = Envelope::builder("discord", "proj-1")
                .platform_config_id("cfg-1")
                .thread_id("chan")
                .user("9", None)
                .reaction("👍", kind)
                .provider("m-1", serde_json::Value::Null)
                .build()
                .unwrap();
            processor.process(envelope).await;
        }

        let reactions = store
            .list_reactions("proj-1", Some("m-1"), Pagination::default())
            .await
            .unwrap();
        assert_eq!(reactions.len(), 2);

        let events = dispatcher.events.lock().await;
        assert_eq!(events[0].event, EventKind::ReactionAdded);
        assert_eq!(events[1].event, EventKind::ReactionRemoved);
    }

    #[tokio::test]
    async fn test_identity_resolved_as_side_effect() {
        let (store, _, processor) = setup();
        processor.process(message_envelope("42", "hi")).await;

        use gatekit_store::IdentityStore;
        let alias = store.alias_by_tuple("cfg-1", "7").await.unwrap();
        assert!(alias.is_some());
        assert_eq!(alias.unwrap().provider_user_display.as_deref(), Some("alice"));
    }

    #[test]
    fn test_sharding_is_stable_per_thread() {
        let envelope = message_envelope("1", "x");
        let shard_a = shard_for(&envelope, 8);
        let shard_b = shard_for(&envelope, 8);
        assert_eq!(shard_a, shard_b);
    }
}
