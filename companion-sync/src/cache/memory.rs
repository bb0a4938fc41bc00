//! In-memory cache backend
//!
//! Used by tests and by embedders that do not need persistence across
//! restarts. An optional byte quota mimics the storage limits of the
//! on-device stores so quota exhaustion can be exercised.

use super::backend::CacheBackend;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes once keys plus values exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut entries = self.entries.write().await;

        if let Some(quota) = self.quota_bytes {
            let replaced = entries.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let used = Self::used_bytes(&entries) - replaced;
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(SyncError::QuotaExceeded { needed, available });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> SyncResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> SyncResult<usize> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
