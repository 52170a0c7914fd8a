//! Key-value and publish/subscribe store abstraction.
//!
//! The resolution core never talks to a concrete cache backend directly. It
//! goes through two capabilities:
//! - [`KeyValueStore`]: get/set with TTL and an atomic set-if-absent
//! - [`BroadcastChannel`]: fire-and-forget publish plus subscriptions
//!
//! [`MemoryStore`] implements both for a single process, [`RedisStore`]
//! implements both on top of Redis so several processes can share them.

mod cache;
mod memory;
mod redis_store;
mod types;

pub use cache::Cache;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use types::*;
