//! Typed JSON cache handle over a [`KeyValueStore`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{KeyValueStore, StoreError};

/// A namespaced cache of `T` values serialized as JSON.
///
/// Several handles may share one store; the namespace keeps their keys apart.
pub struct Cache<T> {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Cache<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a cache handle writing under `namespace`.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            _marker: PhantomData,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Read a value. Entries that no longer deserialize are treated as misses.
    pub async fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        let full_key = self.full_key(key);
        match self.store.get(&full_key).await? {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!("Cache HIT: {}", full_key);
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", full_key, e);
                    self.store.delete(&full_key).await?;
                    Ok(None)
                }
            },
            None => {
                debug!("Cache MISS: {}", full_key);
                Ok(None)
            }
        }
    }

    /// Write a value with the given TTL.
    pub async fn set(&self, key: &str, value: &T, ttl: Duration) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.set(&self.full_key(key), &json, Some(ttl)).await
    }

    /// Remove a value.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.full_key(key)).await
    }
}
