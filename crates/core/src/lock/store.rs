//! Lock backend over a shared key-value store with publish/subscribe.
//!
//! Key layout, all under the configured namespace:
//! - `lock:<key>` holds the owner token, expiring with the lock TTL
//! - `lock:<key>:result` holds the encoded outcome for the grace window
//! - `lock:<key>:done` is the channel the outcome is published on

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{BackendError, LockBackend, LockBackendKind, ABANDONED_OUTCOME};
use crate::store::PubSubStore;

pub struct StoreLockBackend {
    store: Arc<dyn PubSubStore>,
    namespace: String,
}

impl StoreLockBackend {
    pub fn new(store: Arc<dyn PubSubStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    fn marker_key(&self, key: &str) -> String {
        format!("{}lock:{}", self.namespace, key)
    }

    fn result_key(&self, key: &str) -> String {
        format!("{}lock:{}:result", self.namespace, key)
    }

    fn channel(&self, key: &str) -> String {
        format!("{}lock:{}:done", self.namespace, key)
    }
}

#[async_trait]
impl LockBackend for StoreLockBackend {
    fn kind(&self) -> LockBackendKind {
        LockBackendKind::Store
    }

    async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let acquired = self
            .store
            .set_if_absent(&self.marker_key(key), owner, ttl)
            .await?;
        if acquired {
            // A result from the previous cycle must not leak into this one
            self.store.delete(&self.result_key(key)).await?;
        }
        Ok(acquired)
    }

    async fn complete(
        &self,
        key: &str,
        owner: &str,
        payload: &str,
        grace: Duration,
    ) -> Result<(), BackendError> {
        let marker = self.marker_key(key);
        let still_owner = self.store.get(&marker).await?.as_deref() == Some(owner);

        if still_owner {
            self.store
                .set(&self.result_key(key), payload, Some(grace))
                .await?;
        } else {
            warn!(key = %key, owner = %owner, store = %self.store.name(), "Lock marker lost before completion");
        }

        self.store.publish(&self.channel(key), payload).await?;

        if still_owner {
            // Not atomic with the check above; a takeover in between only
            // shortens the new owner's marker to the grace window.
            self.store.expire(&marker, grace).await?;
        }

        debug!(key = %key, owner = %owner, "Published lock outcome");
        Ok(())
    }

    async fn release(&self, key: &str, owner: &str, grace: Duration) -> Result<(), BackendError> {
        let marker = self.marker_key(key);
        if self.store.get(&marker).await?.as_deref() != Some(owner) {
            return Ok(());
        }

        // Late waiters find the abandonment under the result key
        self.store
            .set(&self.result_key(key), ABANDONED_OUTCOME, Some(grace))
            .await?;
        self.store.delete(&marker).await?;
        self.store
            .publish(&self.channel(key), ABANDONED_OUTCOME)
            .await?;

        debug!(key = %key, owner = %owner, "Released lock without outcome");
        Ok(())
    }

    async fn wait_for_outcome(&self, key: &str) -> Result<Option<String>, BackendError> {
        // Subscribe before checking state so a publish cannot slip between.
        let mut subscription = self.store.subscribe(&self.channel(key)).await?;

        if let Some(payload) = self.store.get(&self.result_key(key)).await? {
            return Ok(Some(payload));
        }
        if !self.store.exists(&self.marker_key(key)).await? {
            debug!(key = %key, "Lock vanished before subscription completed");
            return Ok(None);
        }

        Ok(subscription.next().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    fn backend(store: &Arc<MemoryStore>) -> StoreLockBackend {
        StoreLockBackend::new(Arc::clone(store) as Arc<dyn PubSubStore>, "test:")
    }

    #[tokio::test]
    async fn test_key_convention() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store);

        assert!(backend
            .try_acquire("resolve:abc", "owner-1", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(
            store.get("test:lock:resolve:abc").await.unwrap().as_deref(),
            Some("owner-1")
        );
    }

    #[tokio::test]
    async fn test_two_backends_share_one_store() {
        let store = Arc::new(MemoryStore::new());
        let first = backend(&store);
        let second = Arc::new(backend(&store));

        assert!(first
            .try_acquire("k", "a", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!second
            .try_acquire("k", "b", Duration::from_secs(60))
            .await
            .unwrap());

        let waiter = {
            let second = Arc::clone(&second);
            tokio::spawn(async move { second.wait_for_outcome("k").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        first
            .complete("k", "a", r#"{"value":"link"}"#, Duration::from_secs(2))
            .await
            .unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome.as_deref(), Some(r#"{"value":"link"}"#));
    }

    #[tokio::test]
    async fn test_late_waiter_reads_retained_result() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store);
        backend
            .try_acquire("k", "a", Duration::from_secs(60))
            .await
            .unwrap();
        backend
            .complete("k", "a", "payload", Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(
            backend.wait_for_outcome("k").await.unwrap().as_deref(),
            Some("payload")
        );
    }

    #[tokio::test]
    async fn test_release_frees_marker_and_notifies_waiters() {
        let store = Arc::new(MemoryStore::new());
        let owner = backend(&store);
        let other = Arc::new(backend(&store));
        let ttl = Duration::from_secs(60);
        owner.try_acquire("k", "a", ttl).await.unwrap();

        let waiter = {
            let other = Arc::clone(&other);
            tokio::spawn(async move { other.wait_for_outcome("k").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        owner
            .release("k", "a", Duration::from_secs(2))
            .await
            .unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome.as_deref(), Some(ABANDONED_OUTCOME));
        assert!(!store.exists("test:lock:k").await.unwrap());

        // A waiter arriving after the publish still learns about it
        assert_eq!(
            other.wait_for_outcome("k").await.unwrap().as_deref(),
            Some(ABANDONED_OUTCOME)
        );

        // Taking over clears the stale abandonment
        assert!(other.try_acquire("k", "b", ttl).await.unwrap());
        assert!(!store.exists("test:lock:k:result").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_by_stale_owner_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store);
        backend
            .try_acquire("k", "a", Duration::from_secs(60))
            .await
            .unwrap();

        backend
            .release("k", "intruder", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            store.get("test:lock:k").await.unwrap().as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn test_vanished_lock_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store);
        assert_eq!(backend.wait_for_outcome("never-acquired").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_after_grace() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store);
        let ttl = Duration::from_secs(60);

        backend.try_acquire("k", "a", ttl).await.unwrap();
        backend
            .complete("k", "a", "old", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!backend.try_acquire("k", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(backend.try_acquire("k", "b", ttl).await.unwrap());
        assert!(!store.exists("test:lock:k:result").await.unwrap());
    }
}
