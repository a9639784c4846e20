//! Key-value store capability used for shared queue and cooldown markers.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed value for key {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Shared key-value cache with expiring entries.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite. `None` means the entry never expires.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove an entry. Returns whether it existed.
    async fn forget(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically insert only if no live entry exists. Returns whether the
    /// value was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Time left before an entry expires. `None` if absent or non-expiring.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}
