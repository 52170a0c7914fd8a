//! Process-local lock backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{BackendError, LockBackend, LockBackendKind, ABANDONED_OUTCOME};

#[derive(Debug)]
struct MemoryLockEntry {
    owner: String,
    expires_at: Instant,
    outcome: Option<String>,
    waiters: Vec<oneshot::Sender<String>>,
}

impl MemoryLockEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    fn is_abandoned(&self) -> bool {
        self.outcome.as_deref() == Some(ABANDONED_OUTCOME)
    }
}

/// Lock table living in this process. Waiters are parked on the entry and
/// woken directly by the owner.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockBackend {
    entries: Arc<Mutex<HashMap<String, MemoryLockEntry>>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, live or in grace.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    fn kind(&self) -> LockBackendKind {
        LockBackendKind::Memory
    }

    async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        // Sweep expired entries on every acquisition attempt
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        if entries.len() < before {
            debug!(swept = before - entries.len(), "Swept expired lock entries");
        }

        if let Some(existing) = entries.get(key) {
            if !existing.is_abandoned() {
                return Ok(false);
            }
            debug!(key = %key, owner = %existing.owner, "Taking over abandoned lock entry");
        }

        entries.insert(
            key.to_string(),
            MemoryLockEntry {
                owner: owner.to_string(),
                expires_at: now + ttl,
                outcome: None,
                waiters: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn complete(
        &self,
        key: &str,
        owner: &str,
        payload: &str,
        grace: Duration,
    ) -> Result<(), BackendError> {
        let expires_at = {
            let mut entries = self.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(key).filter(|e| e.owner == owner) else {
                warn!(key = %key, owner = %owner, "Lock lost before completion, outcome not shared");
                return Ok(());
            };

            entry.outcome = Some(payload.to_string());
            entry.expires_at = Instant::now() + grace;
            for waiter in entry.waiters.drain(..) {
                // Waiters that already timed out dropped their receiver
                let _ = waiter.send(payload.to_string());
            }
            entry.expires_at
        };

        let entries = Arc::clone(&self.entries);
        let key = key.to_string();
        let owner = owner.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut entries = entries.lock().unwrap();
            let finished = entries
                .get(&key)
                .is_some_and(|e| e.owner == owner && !e.is_live(Instant::now()));
            if finished {
                entries.remove(&key);
            }
        });

        Ok(())
    }

    async fn release(&self, key: &str, owner: &str, grace: Duration) -> Result<(), BackendError> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries
            .get_mut(key)
            .filter(|e| e.owner == owner && e.outcome.is_none())
        else {
            return Ok(());
        };

        entry.outcome = Some(ABANDONED_OUTCOME.to_string());
        entry.expires_at = Instant::now() + grace;
        for waiter in entry.waiters.drain(..) {
            let _ = waiter.send(ABANDONED_OUTCOME.to_string());
        }
        debug!(key = %key, owner = %owner, "Released lock without outcome");
        Ok(())
    }

    async fn wait_for_outcome(&self, key: &str) -> Result<Option<String>, BackendError> {
        let (rx, expires_at) = {
            let now = Instant::now();
            let mut entries = self.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) else {
                return Ok(None);
            };
            if let Some(outcome) = &entry.outcome {
                return Ok(Some(outcome.clone()));
            }
            let (tx, rx) = oneshot::channel();
            entry.waiters.push(tx);
            (rx, entry.expires_at)
        };

        tokio::select! {
            outcome = rx => Ok(outcome.ok()),
            _ = tokio::time::sleep_until(expires_at) => Ok(None),
        }
    }
}
