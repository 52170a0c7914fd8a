//! Process-local store implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use super::{BroadcastChannel, KeyValueStore, StoreError, Subscription};

/// Buffered messages per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Minimum time between two full sweeps of expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, MemoryEntry>,
    last_sweep: Instant,
}

impl Entries {
    /// Drop every expired key, at most once per [`SWEEP_INTERVAL`].
    fn sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = now;

        let before = self.map.len();
        self.map.retain(|_, e| !e.is_expired(now));
        let swept = before - self.map.len();
        if swept > 0 {
            debug!(swept, "Swept expired store keys");
        }
    }
}

/// In-memory key-value store with TTLs and broadcast channels.
///
/// Expired keys are removed when read and swept in bulk on writes. Sharing
/// one instance between several
/// [`DistributedLock`](crate::lock::DistributedLock)s behaves like several
/// processes sharing one Redis.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            channels: Mutex::new(HashMap::new()),
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the table for a write, sweeping expired keys first.
    fn entries_for_write(&self, now: Instant) -> MutexGuard<'_, Entries> {
        let mut entries = self.entries.lock().unwrap();
        entries.sweep(now);
        entries
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        entries.map.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Number of keys held, including expired ones not yet swept.
    pub fn stored_len(&self) -> usize {
        self.entries.lock().unwrap().map.len()
    }

    /// Number of channels with a live subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.map.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|t| now + t),
        };
        self.entries_for_write(now)
            .map
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries_for_write(now);
        if let Some(existing) = entries.map.get(key) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        entries.map.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.map.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            Some(_) => {
                entries.map.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().map.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl BroadcastChannel for MemoryStore {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(channel) {
            if sender.send(payload.to_string()).is_err() {
                // Nobody listening anymore
                channels.remove(channel);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let rx = {
            let mut channels = self.channels.lock().unwrap();
            // Channels whose subscribers all gave up without a publish
            channels.retain(|_, sender| sender.receiver_count() > 0);
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
