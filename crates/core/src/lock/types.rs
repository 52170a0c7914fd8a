//! Lock options, results and errors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Default maximum time a waiter blocks on someone else's lock.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default validity of an acquired lock before it counts as abandoned.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default time an outcome stays observable after the owner finished.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Strategy used to coordinate callers sharing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBackendKind {
    /// Process-local table; waiters parked on the entry.
    #[default]
    Memory,
    /// Key-value store with publish/subscribe notifications.
    #[serde(alias = "pubsub_store")]
    Store,
    /// Relational table polled by waiters.
    Sqlite,
}

impl LockBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockBackendKind::Memory => "memory",
            LockBackendKind::Store => "store",
            LockBackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for LockBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call lock options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Maximum wait for a non-owner.
    pub timeout: Duration,
    /// How long an acquired lock stays valid.
    pub ttl: Duration,
    /// Which backend coordinates this call.
    pub backend: LockBackendKind,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            ttl: DEFAULT_TTL,
            backend: LockBackendKind::default(),
        }
    }
}

impl LockOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_backend(mut self, backend: LockBackendKind) -> Self {
        self.backend = backend;
        self
    }
}

/// Value produced by [`DistributedLock::with_lock`](super::DistributedLock::with_lock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockResult<T> {
    pub result: T,
    /// `false` for the caller that ran the protected function, `true` for waiters.
    pub cached: bool,
}

/// Outcome payload exchanged between owner and waiters.
///
/// Encodes as `{"value": ..}` or `{"error": ..}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Outcome<T, E> {
    Value(T),
    Error(E),
    /// The owner's outcome could not be encoded.
    Unencodable(String),
    /// The owner went away without an outcome; waiters compete again.
    Abandoned,
}

/// Encoded [`Outcome::Abandoned`], published when an owner releases a key.
pub const ABANDONED_OUTCOME: &str = r#""abandoned""#;

/// Failure inside a lock backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<StoreError> for BackendError {
    fn from(e: StoreError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(format!("Database error: {}", e))
    }
}

/// Errors returned by `with_lock`.
#[derive(Debug, Error)]
pub enum LockError<E> {
    #[error("Timed out after {waited:?} waiting for lock {key}")]
    Timeout { key: String, waited: Duration },

    #[error("Lock backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Locked operation failed: {0}")]
    Failed(E),

    #[error("Lock outcome serialization error: {0}")]
    Serialization(String),

    #[error("Lock backend not configured: {0}")]
    BackendNotConfigured(LockBackendKind),
}

impl<E> LockError<E> {
    /// Whether retrying the same call later may succeed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_serde() {
        let kind: LockBackendKind = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(kind, LockBackendKind::Sqlite);

        let kind: LockBackendKind = serde_json::from_str("\"pubsub_store\"").unwrap();
        assert_eq!(kind, LockBackendKind::Store);

        assert_eq!(serde_json::to_string(&LockBackendKind::Store).unwrap(), "\"store\"");
    }

    #[test]
    fn test_outcome_wire_format() {
        let ok: Outcome<u32, String> = Outcome::Value(7);
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"value":7}"#);

        let err: Outcome<u32, String> = Outcome::Error("boom".to_string());
        assert_eq!(serde_json::to_string(&err).unwrap(), r#"{"error":"boom"}"#);

        let decoded: Outcome<u32, String> = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert!(matches!(decoded, Outcome::Error(e) if e == "boom"));

        let abandoned: Outcome<u32, String> = Outcome::Abandoned;
        assert_eq!(serde_json::to_string(&abandoned).unwrap(), ABANDONED_OUTCOME);
        let decoded: Outcome<u32, String> = serde_json::from_str(ABANDONED_OUTCOME).unwrap();
        assert!(matches!(decoded, Outcome::Abandoned));
    }

    #[test]
    fn test_default_options() {
        let options = LockOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.ttl, Duration::from_secs(60));
        assert_eq!(options.backend, LockBackendKind::Memory);
    }

    #[test]
    fn test_error_display() {
        let err: LockError<String> = LockError::Failed("provider down".to_string());
        assert_eq!(err.to_string(), "Locked operation failed: provider down");

        let err: LockError<String> = LockError::BackendNotConfigured(LockBackendKind::Sqlite);
        assert_eq!(err.to_string(), "Lock backend not configured: sqlite");
        assert!(!err.is_timeout());
    }
}
