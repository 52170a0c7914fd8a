use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::memory::MemoryLockBackend;
use super::store::StoreLockBackend;
use super::types::Outcome;
use super::{LockBackend, LockBackendKind, LockError, LockOptions, LockResult, DEFAULT_GRACE};
use crate::metrics;
use crate::store::PubSubStore;

/// Single-flight executor.
///
/// For every key, exactly one concurrent caller runs the protected function;
/// the others wait and receive a copy of its outcome. The in-memory backend
/// is always available; shared backends are registered at startup.
#[derive(Clone)]
pub struct DistributedLock {
    backends: HashMap<LockBackendKind, Arc<dyn LockBackend>>,
    grace: Duration,
}

impl Default for DistributedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributedLock {
    pub fn new() -> Self {
        let mut backends: HashMap<LockBackendKind, Arc<dyn LockBackend>> = HashMap::new();
        backends.insert(LockBackendKind::Memory, Arc::new(MemoryLockBackend::new()));
        Self {
            backends,
            grace: DEFAULT_GRACE,
        }
    }

    /// Register (or replace) the backend for its kind.
    pub fn with_backend(mut self, backend: Arc<dyn LockBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Register the pub/sub backend over a shared store.
    pub fn with_store(self, store: Arc<dyn PubSubStore>, namespace: impl Into<String>) -> Self {
        self.with_backend(Arc::new(StoreLockBackend::new(store, namespace)))
    }

    /// How long a finished outcome stays observable.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn has_backend(&self, kind: LockBackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Run `f` at most once concurrently per `key`.
    ///
    /// The owner gets `cached: false` and its own result; waiters get the
    /// owner's result (or error) with `cached: true`. A waiter that exceeds
    /// `options.timeout` fails with [`LockError::Timeout`] without affecting
    /// the owner. If the owner's future is dropped before `f` finishes, the
    /// key is released and the waiters compete for ownership again.
    pub async fn with_lock<T, E, F, Fut>(
        &self,
        key: &str,
        f: F,
        options: &LockOptions,
    ) -> Result<LockResult<T>, LockError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: Serialize + DeserializeOwned,
    {
        let Some(backend) = self.backends.get(&options.backend) else {
            return Err(LockError::BackendNotConfigured(options.backend));
        };
        let backend_name = options.backend.as_str();
        let owner = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + options.timeout;
        let mut waiting = false;

        loop {
            if backend.try_acquire(key, &owner, options.ttl).await? {
                metrics::LOCK_ACQUISITIONS
                    .with_label_values(&[backend_name, "owner"])
                    .inc();
                debug!(key = %key, owner = %owner, backend = backend_name, "Acquired lock");
                return self.run_owner(backend, key, owner, f).await;
            }

            if !waiting {
                waiting = true;
                metrics::LOCK_ACQUISITIONS
                    .with_label_values(&[backend_name, "waiter"])
                    .inc();
                debug!(key = %key, backend = backend_name, "Waiting on lock owner");
            }

            let waited = tokio::time::timeout_at(deadline, backend.wait_for_outcome(key)).await;
            if let Ok(Ok(Some(payload))) = &waited {
                if let Some(result) = decode_outcome(payload) {
                    metrics::LOCK_WAIT_DURATION
                        .with_label_values(&[backend_name])
                        .observe(started.elapsed().as_secs_f64());
                    return result;
                }
                debug!(key = %key, backend = backend_name, "Lock owner abandoned the key, retrying");
                continue;
            }

            metrics::LOCK_WAIT_DURATION
                .with_label_values(&[backend_name])
                .observe(started.elapsed().as_secs_f64());
            return match waited {
                Ok(Err(e)) => Err(LockError::Backend(e)),
                _ => {
                    metrics::LOCK_TIMEOUTS.with_label_values(&[backend_name]).inc();
                    warn!(key = %key, backend = backend_name, timeout = ?options.timeout, "Gave up waiting for lock");
                    Err(LockError::Timeout {
                        key: key.to_string(),
                        waited: started.elapsed(),
                    })
                }
            };
        }
    }

    async fn run_owner<T, E, F, Fut>(
        &self,
        backend: &Arc<dyn LockBackend>,
        key: &str,
        owner: String,
        f: F,
    ) -> Result<LockResult<T>, LockError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: Serialize + DeserializeOwned,
    {
        let mut guard = OwnerGuard {
            backend: Arc::clone(backend),
            key: key.to_string(),
            owner,
            grace: self.grace,
            armed: true,
        };

        let result = f().await;

        let payload = encode_outcome(&result);
        if let Err(e) = backend.complete(key, &guard.owner, &payload, self.grace).await {
            error!(key = %key, backend = %backend.kind(), error = %e, "Failed to publish lock outcome");
        }
        guard.armed = false;

        match result {
            Ok(value) => Ok(LockResult {
                result: value,
                cached: false,
            }),
            Err(e) => Err(LockError::Failed(e)),
        }
    }
}

/// Releases the key when an owner's future is dropped before completing.
struct OwnerGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    owner: String,
    grace: Duration,
    armed: bool,
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "No runtime to release abandoned lock, it will expire instead");
            return;
        };

        warn!(key = %self.key, owner = %self.owner, "Lock owner dropped before finishing, releasing");
        let backend = Arc::clone(&self.backend);
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        let grace = self.grace;
        runtime.spawn(async move {
            if let Err(e) = backend.release(&key, &owner, grace).await {
                error!(key = %key, error = %e, "Failed to release abandoned lock");
            }
        });
    }
}

fn encode_outcome<T: Serialize, E: Serialize>(result: &Result<T, E>) -> String {
    let outcome = match result {
        Ok(value) => Outcome::<&T, &E>::Value(value),
        Err(e) => Outcome::Error(e),
    };
    serde_json::to_string(&outcome).unwrap_or_else(|e| {
        let fallback: Outcome<(), ()> = Outcome::Unencodable(e.to_string());
        serde_json::to_string(&fallback).unwrap_or_default()
    })
}

/// Decode a waiter's payload; `None` means the owner abandoned the key.
fn decode_outcome<T, E>(payload: &str) -> Option<Result<LockResult<T>, LockError<E>>>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    let decoded = match serde_json::from_str::<Outcome<T, E>>(payload) {
        Ok(Outcome::Value(value)) => Ok(LockResult {
            result: value,
            cached: true,
        }),
        Ok(Outcome::Error(e)) => Err(LockError::Failed(e)),
        Ok(Outcome::Unencodable(message)) => Err(LockError::Serialization(message)),
        Ok(Outcome::Abandoned) => return None,
        Err(e) => Err(LockError::Serialization(e.to_string())),
    };
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_single_caller_is_owner() {
        let lock = DistributedLock::new();
        let result = lock
            .with_lock("k", || async { Ok::<_, String>(42) }, &LockOptions::default())
            .await;

        let result = assert_ok!(result);
        assert_eq!(result.result, 42);
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let lock = DistributedLock::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = LockOptions::default();

        let run = || {
            let calls = Arc::clone(&calls);
            let lock = lock.clone();
            async move {
                lock.with_lock(
                    "shared",
                    || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>("link".to_string())
                    },
                    &options,
                )
                .await
            }
        };

        let results = futures::future::join_all((0..5).map(|_| run())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(results.iter().all(|r| r.result == "link"));
        assert_eq!(results.iter().filter(|r| !r.cached).count(), 1);
    }

    #[tokio::test]
    async fn test_owner_error_replayed_to_waiters() {
        let lock = DistributedLock::new();
        let options = LockOptions::default();

        let owner = lock.with_lock(
            "failing",
            || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err::<u32, _>("provider down".to_string())
            },
            &options,
        );
        let waiter = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            lock.with_lock("failing", || async { Ok::<u32, String>(1) }, &options)
                .await
        };

        let (owner, waiter) = tokio::join!(owner, waiter);
        assert!(matches!(owner, Err(LockError::Failed(ref e)) if e == "provider down"));
        assert!(matches!(waiter, Err(LockError::Failed(ref e)) if e == "provider down"));
    }

    #[tokio::test]
    async fn test_dropped_owner_hands_key_to_waiter() {
        let lock = DistributedLock::new();
        let options = LockOptions::default().with_timeout(Duration::from_secs(5));

        let owner = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.with_lock(
                    "abandoned",
                    || async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok::<_, String>("never".to_string())
                    },
                    &options,
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        owner.abort();
        assert!(owner.await.unwrap_err().is_cancelled());

        let started = Instant::now();
        let next = lock
            .with_lock(
                "abandoned",
                || async { Ok::<_, String>("fresh".to_string()) },
                &options,
            )
            .await;

        let next = assert_ok!(next);
        assert_eq!(next.result, "fresh");
        assert!(!next.cached);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unregistered_backend() {
        let lock = DistributedLock::new();
        let options = LockOptions::default().with_backend(LockBackendKind::Sqlite);

        let result = lock
            .with_lock("k", || async { Ok::<_, String>(1) }, &options)
            .await;
        let err = assert_err!(result);
        assert!(matches!(
            err,
            LockError::BackendNotConfigured(LockBackendKind::Sqlite)
        ));
    }

    #[test]
    fn test_unencodable_outcome_reaches_waiters_as_serialization_error() {
        let payload = r#"{"unencodable":"key must be a string"}"#;
        let decoded = decode_outcome::<u32, String>(payload).unwrap();
        assert!(matches!(decoded, Err(LockError::Serialization(ref m)) if m == "key must be a string"));

        let garbage = decode_outcome::<u32, String>("not json").unwrap();
        assert!(matches!(garbage, Err(LockError::Serialization(_))));

        assert!(decode_outcome::<u32, String>(crate::lock::ABANDONED_OUTCOME).is_none());
    }

    #[test]
    fn test_encode_outcome_shapes() {
        assert_eq!(encode_outcome::<u32, String>(&Ok(5)), r#"{"value":5}"#);
        assert_eq!(
            encode_outcome::<u32, String>(&Err("x".to_string())),
            r#"{"error":"x"}"#
        );
    }
}
