//! Persistent key/value storage behind the cache store

use crate::error::SyncResult;
use async_trait::async_trait;

/// Raw storage primitive. Values are opaque serialized strings.
///
/// Only [`CacheStore`](super::CacheStore) talks to a backend; nothing else in
/// the engine is allowed to mutate storage directly.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Insert or replace `key` in a single atomic step.
    async fn put(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Returns whether the key existed.
    async fn remove(&self, key: &str) -> SyncResult<bool>;

    /// Remove every entry, returning how many were removed.
    async fn clear(&self) -> SyncResult<usize>;

    async fn keys(&self) -> SyncResult<Vec<String>>;
}
