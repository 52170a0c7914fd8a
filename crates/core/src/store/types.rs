//! Store traits and errors.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors raised by a store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),
}

/// Stream of payloads published on a channel after the subscription was
/// established. Ends when the underlying connection closes.
pub type Subscription = BoxStream<'static, String>;

/// String key-value store with per-key expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Read a key. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically write a key only if it does not exist (or has expired).
    ///
    /// Returns `true` when this call created the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Replace the expiry of an existing key. Returns `false` if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Check whether a key exists and has not expired.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Publish/subscribe capability used for cross-process notifications.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Publish a payload. Subscribers that are not connected miss it.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribe to a channel. The returned stream only yields payloads
    /// published after this call resolved.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;
}

/// A store that provides both capabilities, as required by the pub/sub lock.
pub trait PubSubStore: KeyValueStore + BroadcastChannel {}

impl<T: KeyValueStore + BroadcastChannel> PubSubStore for T {}
