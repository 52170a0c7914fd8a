//! Single-flight lock.
//!
//! [`DistributedLock::with_lock`] guarantees that one caller per key runs
//! an expensive operation while every other concurrent caller waits for and
//! receives the same outcome. Three backends implement [`LockBackend`]:
//! - [`MemoryLockBackend`]: coordinates within one process
//! - [`StoreLockBackend`]: coordinates processes sharing a pub/sub store
//! - [`SqliteLockBackend`]: coordinates processes sharing a SQLite file

mod memory;
mod single_flight;
mod sqlite;
mod store;
mod traits;
mod types;

pub use memory::MemoryLockBackend;
pub use single_flight::DistributedLock;
pub use sqlite::{
    create_in_memory_sqlite_lock, create_sqlite_lock, LockTableWriter, SqliteLockBackend,
    DEFAULT_POLL_INTERVAL,
};
pub use store::StoreLockBackend;
pub use traits::LockBackend;
pub use types::{
    BackendError, LockBackendKind, LockError, LockOptions, LockResult, ABANDONED_OUTCOME,
    DEFAULT_GRACE, DEFAULT_TIMEOUT, DEFAULT_TTL,
};
