//! TTL'd key-value view of each request's lifecycle, keyed by
//! channel-qualified request id.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use dn_common::{DnError, StatusRecord};

pub type Result<T> = std::result::Result<T, DnError>;

/// Key-value store with TTL and atomic set-if-absent semantics.
///
/// Guarantees: writes are durable for the TTL window; reads observe the
/// most recent committed write. Infrastructure failures (connection loss,
/// serialization) propagate as `DnError::Infrastructure`.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Returns the current record, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<StatusRecord>>;

    /// Unconditional write with TTL; overwrites any prior value.
    async fn put(&self, key: &str, record: &StatusRecord, ttl: Duration) -> Result<()>;

    /// Atomic admission primitive: writes only if `key` is currently
    /// absent. Returns `true` if the write was accepted.
    async fn put_if_absent(&self, key: &str, record: &StatusRecord, ttl: Duration) -> Result<bool>;
}

pub use memory::InMemoryStatusStore;
pub use redis_store::RedisStatusStore;
