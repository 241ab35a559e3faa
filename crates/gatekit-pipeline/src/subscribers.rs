//! Webhook subscriber fan-out
//!
//! For every emitted gateway event, active subscribers whose event set
//! matches get an HMAC-signed POST with at-least-once semantics: up to five
//! attempts, exponential backoff base 5s capped at 10 minutes, jittered
//! ±20%. Every attempt lands on the delivery record. Retries for one
//! subscriber never stall deliveries to another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use gatekit_core::{EventRecord, Webhook, WebhookDelivery, WebhookDeliveryStatus};
use gatekit_crypto::{sign_payload, SIGNATURE_HEADER};
use gatekit_store::{Store, WebhookStore};

const RESPONSE_BODY_LIMIT: usize = 1024;

/// Where pipelines push gateway events. The webhook dispatcher is the
/// production implementation; tests substitute a recorder.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: EventRecord);
}

/// Delivery tuning
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub workers: usize,
    pub attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Jitter fraction applied to each backoff (0.2 = ±20%)
    pub jitter: f64,
    pub timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(600),
            jitter: 0.2,
            timeout: Duration::from_secs(10),
        }
    }
}

struct DeliveryItem {
    delivery_id: String,
    attempt: u32,
}

/// Signs and delivers subscriber webhooks
pub struct WebhookDispatcher {
    store: Arc<dyn Store>,
    http: reqwest::Client,
    tx: mpsc::Sender<DeliveryItem>,
    config: DeliveryConfig,
}

impl WebhookDispatcher {
    /// Build the dispatcher and start its delivery workers
    pub fn start(store: Arc<dyn Store>, config: DeliveryConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<DeliveryItem>(1024);
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        let dispatcher = Arc::new(Self {
            store,
            http,
            tx,
            config,
        });

        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..dispatcher.config.workers.max(1) {
            let dispatcher = dispatcher.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                debug!(worker_id, "delivery worker started");
                loop {
                    let item = { rx.lock().await.recv().await };
                    let Some(item) = item else { break };
                    dispatcher.attempt(item).await;
                }
            });
        }
        dispatcher
    }

    /// Subscribers matching an event: active, with the event in their set
    async fn matching_webhooks(&self, event: &EventRecord) -> Vec<Webhook> {
        let webhooks = match self.store.list_webhooks(&event.project_id).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                warn!("failed to list webhooks: {e}");
                return Vec::new();
            }
        };
        let name = event.event.as_str();
        webhooks
            .into_iter()
            .filter(|w| w.is_active && w.events.iter().any(|e| e == name))
            .collect()
    }

    async fn attempt(&self, item: DeliveryItem) {
        let Ok(Some(mut delivery)) = self.store.delivery_by_id(&item.delivery_id).await else {
            warn!(delivery = %item.delivery_id, "delivery record vanished");
            return;
        };
        let Ok(Some(webhook)) = self.store.webhook_by_id(&delivery.webhook_id).await else {
            delivery.status = WebhookDeliveryStatus::Failed;
            delivery.response_body = Some("subscriber deleted".into());
            let _ = self.store.update_delivery(delivery).await;
            return;
        };

        // Sign the exact bytes that go on the wire
        let body = match serde_json::to_vec(&delivery.payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("unserializable delivery payload: {e}");
                return;
            }
        };
        let signature = sign_payload(&webhook.secret, &body);

        let response = self
            .http
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        delivery.attempt_count = item.attempt;
        delivery.last_attempt_at = Some(Utc::now());

        let succeeded = match response {
            Ok(response) => {
                let status = response.status().as_u16();
                delivery.response_code = Some(status);
                let text = response.text().await.unwrap_or_default();
                delivery.response_body = Some(truncate(&text, RESPONSE_BODY_LIMIT));
                (200..300).contains(&status)
            }
            Err(e) => {
                delivery.response_code = None;
                delivery.response_body = Some(truncate(&e.to_string(), RESPONSE_BODY_LIMIT));
                false
            }
        };

        if succeeded {
            delivery.status = WebhookDeliveryStatus::Success;
            let _ = self.store.update_delivery(delivery).await;
            return;
        }

        if item.attempt >= self.config.attempts {
            info!(webhook = %webhook.id, "delivery failed after final attempt");
            delivery.status = WebhookDeliveryStatus::Failed;
            let _ = self.store.update_delivery(delivery).await;
            return;
        }

        let _ = self.store.update_delivery(delivery).await;
        let delay = self.backoff(item.attempt);
        debug!(
            webhook = %webhook.id,
            attempt = item.attempt,
            ?delay,
            "delivery failed, retrying"
        );
        let tx = self.tx.clone();
        let next = DeliveryItem {
            delivery_id: item.delivery_id,
            attempt: item.attempt + 1,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(next).await;
        });
    }

    /// Exponential backoff with cap and ±jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.backoff_cap);

        let jitter = self.config.jitter;
        if jitter <= 0.0 {
            return capped;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        capped.mul_f64(factor.max(0.0))
    }
}

#[async_trait]
impl EventDispatcher for WebhookDispatcher {
    async fn dispatch(&self, event: EventRecord) {
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("unserializable event: {e}");
                return;
            }
        };

        for webhook in self.matching_webhooks(&event).await {
            let delivery = WebhookDelivery {
                id: Uuid::new_v4().to_string(),
                webhook_id: webhook.id.clone(),
                project_id: event.project_id.clone(),
                event: event.event.as_str().to_string(),
                payload: payload.clone(),
                status: WebhookDeliveryStatus::Pending,
                attempt_count: 0,
                last_attempt_at: None,
                response_code: None,
                response_body: None,
                created_at: Utc::now(),
            };
            match self.store.insert_delivery(delivery).await {
                Ok(delivery) => {
                    if self
                        .tx
                        .send(DeliveryItem {
                            delivery_id: delivery.id,
                            attempt: 1,
                        })
                        .await
                        .is_err()
                    {
                        warn!("delivery queue is closed");
                    }
                }
                Err(e) => warn!("failed to record delivery: {e}"),
            }
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backoff_schedule() {
        let store: Arc<dyn Store> = Arc::new(gatekit_store::MemoryStore::new());
        let dispatcher = WebhookDispatcher::start(
            store,
            DeliveryConfig {
                jitter: 0.0,
                ..Default::default()
            },
        );

        // 5000ms * 2^(attempt-1), capped at 10min
        assert_eq!(dispatcher.backoff(1), Duration::from_secs(5));
        assert_eq!(dispatcher.backoff(2), Duration::from_secs(10));
        assert_eq!(dispatcher.backoff(3), Duration::from_secs(20));
        assert_eq!(dispatcher.backoff(8), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_backoff_jitter_stays_in_band() {
        let store: Arc<dyn Store> = Arc::new(gatekit_store::MemoryStore::new());
        let dispatcher = WebhookDispatcher::start(store, DeliveryConfig::default());

        for _ in 0..100 {
            let delay = dispatcher.backoff(1);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(6));
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 1024), "short");
        let long = "é".repeat(1000);
        let cut = truncate(&long, 101);
        assert!(cut.len() <= 101);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
