use std::time::Duration;

use async_trait::async_trait;

use super::{BackendError, LockBackendKind};

/// How a single-flight backend takes ownership and learns about outcomes.
///
/// Backends never run the protected function themselves; the
/// [`DistributedLock`](super::DistributedLock) driver does.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Which strategy this backend implements.
    fn kind(&self) -> LockBackendKind;

    /// Try to become the owner of `key` for `ttl`.
    ///
    /// Fails while another owner is active or while a finished outcome is
    /// still inside its grace window.
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration)
        -> Result<bool, BackendError>;

    /// Record the owner's encoded outcome and notify waiters.
    ///
    /// The outcome stays observable for `grace`, after which the key may be
    /// acquired again.
    async fn complete(
        &self,
        key: &str,
        owner: &str,
        payload: &str,
        grace: Duration,
    ) -> Result<(), BackendError>;

    /// Give up ownership without an outcome.
    ///
    /// Parked waiters are handed [`ABANDONED_OUTCOME`](super::ABANDONED_OUTCOME)
    /// and the key becomes acquirable again right away. A no-op when `owner`
    /// no longer holds the key.
    async fn release(&self, key: &str, owner: &str, grace: Duration)
        -> Result<(), BackendError>;

    /// Wait until the current owner of `key` completes.
    ///
    /// Returns `None` when the lock vanished without an outcome (expired or
    /// replaced). Callers bound the wait with their own timeout.
    async fn wait_for_outcome(&self, key: &str) -> Result<Option<String>, BackendError>;
}
