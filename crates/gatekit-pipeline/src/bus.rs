//! In-process event bus
//!
//! Adapters publish envelopes here; the inbound processor subscribes. The
//! bus is a leaf in the ownership graph: it knows nothing about stores,
//! registries, or pipelines.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use gatekit_core::Envelope;
use gatekit_platforms::EnvelopeSink;

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus fanning envelopes out to every subscriber
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// New subscription receiving every envelope published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvelopeSink for EventBus {
    async fn publish(&self, envelope: Envelope) {
        // A send error just means nobody is listening yet
        if self.tx.send(envelope).is_err() {
            debug!("envelope published with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_envelope(text: &str) -> Envelope {
        Envelope::builder("telegram", "proj-1")
            .platform_config_id("cfg-1")
            .thread_id("100")
            .user("7", None)
            .text(text)
            .provider("evt-1", serde_json::Value::Null)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(test_envelope("hi")).await;

        assert_eq!(a.recv().await.unwrap().message.text.as_deref(), Some("hi"));
        assert_eq!(b.recv().await.unwrap().message.text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(test_envelope("nobody home")).await;
    }
}
