//! Per-provider connection pool
//!
//! DashMap of connection slots keyed by the connection key, with creation
//! single-flighted through a per-slot async mutex: concurrent callers for
//! the same key share the one connection that gets built. A credentials
//! fingerprint makes creation idempotent — same credentials return the
//! live instance, changed credentials tear down and rebuild.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use gatekit_core::ConnectionKey;

use crate::error::PlatformResult;
use crate::spi::PlatformConnection;

struct PoolEntry {
    fingerprint: u64,
    connection: Arc<dyn PlatformConnection>,
}

/// Connection pool shared by the concrete adapters
#[derive(Default)]
pub struct ConnectionPool {
    slots: DashMap<String, Arc<Mutex<Option<PoolEntry>>>>,
}

/// Stable fingerprint of a credentials object, for idempotence checks
pub fn credentials_fingerprint(credentials: &serde_json::Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    credentials.to_string().hash(&mut hasher);
    hasher.finish()
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &ConnectionKey) -> Arc<Mutex<Option<PoolEntry>>> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Live connection for a key, if any
    pub async fn get(&self, key: &ConnectionKey) -> Option<Arc<dyn PlatformConnection>> {
        let slot = self.slots.get(&key.to_string())?.clone();
        let guard = slot.lock().await;
        guard.as_ref().map(|entry| entry.connection.clone())
    }

    /// Get the live connection or build one, single-flighted per key.
    ///
    /// When the fingerprint matches the live entry the existing connection
    /// is returned untouched; when it differs the old connection is closed
    /// and replaced.
    pub async fn get_or_create<F, Fut>(
        &self,
        key: &ConnectionKey,
        fingerprint: u64,
        build: F,
    ) -> PlatformResult<Arc<dyn PlatformConnection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PlatformResult<Arc<dyn PlatformConnection>>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if entry.fingerprint == fingerprint {
                return Ok(entry.connection.clone());
            }
            debug!(%key, "credentials changed, rebuilding connection");
            entry.connection.close().await;
            *guard = None;
        }

        let connection = build().await?;
        *guard = Some(PoolEntry {
            fingerprint,
            connection: connection.clone(),
        });
        Ok(connection)
    }

    /// Remove and close a connection; no-op on an absent key
    pub async fn remove(&self, key: &ConnectionKey) {
        let Some((_, slot)) = self.slots.remove(&key.to_string()) else {
            return;
        };
        let mut guard = slot.lock().await;
        if let Some(entry) = guard.take() {
            entry.connection.close().await;
        }
    }

    /// Number of keys with a live connection
    pub async fn len(&self) -> usize {
        let mut count = 0;
        for item in self.slots.iter() {
            if item.value().lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close everything; the pool is reusable afterwards
    pub async fn drain(&self) {
        let slots: Vec<_> = self.slots.iter().map(|s| s.value().clone()).collect();
        self.slots.clear();
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(entry) = guard.take() {
                entry.connection.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use gatekit_core::{Envelope, ReplyPayload};

    use crate::error::{SendError, SendReceipt};

    struct FakeConnection {
        label: usize,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PlatformConnection for FakeConnection {
        async fn send_message(
            &self,
            _envelope: &Envelope,
            _reply: &ReplyPayload,
        ) -> Result<SendReceipt, SendError> {
            Ok(SendReceipt {
                provider_message_id: Some(self.label.to_string()),
            })
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn fake(label: usize, closed: Arc<AtomicUsize>) -> Arc<dyn PlatformConnection> {
        Arc::new(FakeConnection { label, closed })
    }

    #[tokio::test]
    async fn test_same_fingerprint_returns_same_instance() {
        let pool = ConnectionPool::new();
        let key = ConnectionKey::new("p", "c");
        let closed = Arc::new(AtomicUsize::new(0));

        let built = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let built = built.clone();
            let closed = closed.clone();
            pool.get_or_create(&key, 1, move || async move {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(fake(1, closed))
            })
            .await
            .unwrap();
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_changed_fingerprint_rebuilds() {
        let pool = ConnectionPool::new();
        let key = ConnectionKey::new("p", "c");
        let closed = Arc::new(AtomicUsize::new(0));

        {
            let closed = closed.clone();
            pool.get_or_create(&key, 1, move || async move { Ok(fake(1, closed)) })
                .await
                .unwrap();
        }
        {
            let closed = closed.clone();
            pool.get_or_create(&key, 2, move || async move { Ok(fake(2, closed)) })
                .await
                .unwrap();
        }

        // Old connection was torn down; still exactly one live connection
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_key_is_noop() {
        let pool = ConnectionPool::new();
        pool.remove(&ConnectionKey::new("p", "missing")).await;
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_closes_connection() {
        let pool = ConnectionPool::new();
        let key = ConnectionKey::new("p", "c");
        let closed = Arc::new(AtomicUsize::new(0));
        {
            let closed = closed.clone();
            pool.get_or_create(&key, 1, move || async move { Ok(fake(1, closed)) })
                .await
                .unwrap();
        }

        pool.remove(&key).await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(pool.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creation_is_single_flighted() {
        let pool = Arc::new(ConnectionPool::new());
        let key = ConnectionKey::new("p", "c");
        let built = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let key = key.clone();
            let built = built.clone();
            let closed = closed.clone();
            handles.push(tokio::spawn(async move {
                pool.get_or_create(&key, 7, move || async move {
                    built.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok(fake(7, closed))
                })
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_closes_everything() {
        let pool = ConnectionPool::new();
        let closed = Arc::new(AtomicUsize::new(0));
        for i in 0..4 {
            let key = ConnectionKey::new("p", format!("c{i}"));
            let closed = closed.clone();
            pool.get_or_create(&key, 1, move || async move { Ok(fake(i, closed)) })
                .await
                .unwrap();
        }

        pool.drain().await;
        assert_eq!(closed.load(Ordering::SeqCst), 4);
        assert!(pool.is_empty().await);
    }
}
