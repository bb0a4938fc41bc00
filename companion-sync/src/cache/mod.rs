//! On-device cache store
//!
//! One envelope per synced table plus the authentication marker. The store
//! is the only component allowed to touch persistent storage, and its write
//! path is the only place the logout guard is consulted.

mod backend;
mod memory;
mod sqlite;

pub use backend::CacheBackend;
pub use memory::MemoryBackend;
pub use sqlite::{SqliteBackend, StorageConfig};

use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::scheduler::AuthStatus;
use crate::table::TableName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage key of the authentication marker.
pub const AUTH_MARKER_KEY: &str = "auth:marker";

/// Stored wrapper around one table's transformed records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub data: Vec<Value>,
    pub fetched_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the JSON encoding of `data`.
    pub checksum: String,
}

impl CacheEnvelope {
    /// Wrap freshly transformed records, stamping time and checksum.
    pub fn seal(data: Vec<Value>) -> SyncResult<Self> {
        let checksum = Self::checksum_of(&data)?;
        Ok(Self {
            data,
            fetched_at: Utc::now(),
            checksum,
        })
    }

    pub fn checksum_of(data: &[Value]) -> SyncResult<String> {
        let bytes = serde_json::to_vec(data)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Whether `data` still matches the recorded checksum.
    pub fn verify(&self) -> bool {
        Self::checksum_of(&self.data)
            .map(|checksum| checksum == self.checksum)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Persisted proof that a user authenticated on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMarker {
    pub user_id: String,
    pub authenticated_at: DateTime<Utc>,
}

impl AuthMarker {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            authenticated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Written,
    /// The logout guard was raised; storage was not touched.
    Suppressed,
}

/// Logout-in-progress flag.
///
/// In-memory only. Writes hold the shared side of `gate` across their
/// check-and-put, and [`raise`](Self::raise) takes the exclusive side, so
/// once `raise` returns no write that saw the flag lowered is still running.
///
/// Every raise also bumps an epoch. A writer that captured the epoch before
/// a logout stays suppressed after the flag is lowered again.
#[derive(Debug, Clone, Default)]
pub struct LogoutGuard {
    raised: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
    gate: Arc<RwLock<()>>,
}

impl LogoutGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag, waiting for writes already past the check to land.
    pub async fn raise(&self) {
        let _exclusive = self.gate.write().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.raised.store(true, Ordering::SeqCst);
        tracing::debug!("Logout guard raised");
    }

    pub fn lower(&self) {
        self.raised.store(false, Ordering::SeqCst);
        tracing::debug!("Logout guard lowered");
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Number of times the guard has been raised.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn admits(&self, epoch: Option<u64>) -> bool {
        !self.is_raised() && epoch.map_or(true, |e| e == self.epoch())
    }
}

/// Presence summary of one table, for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: TableName,
    pub records: Option<usize>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Envelope store over a [`CacheBackend`].
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    guard: LogoutGuard,
    events: Arc<dyn EventSink>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, events: Arc<dyn EventSink>) -> Self {
        Self {
            backend,
            guard: LogoutGuard::new(),
            events,
        }
    }

    pub fn guard(&self) -> &LogoutGuard {
        &self.guard
    }

    /// Read a table's envelope. Corrupted entries are removed and read as absent.
    pub async fn read(&self, table: TableName) -> SyncResult<Option<CacheEnvelope>> {
        let key = table.cache_key();
        let Some(raw) = self.backend.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEnvelope>(&raw) {
            Ok(envelope) if envelope.verify() => Ok(Some(envelope)),
            _ => {
                self.backend.remove(&key).await?;
                self.events.emit(SyncEvent::CacheEntryCorrupted { key });
                Ok(None)
            }
        }
    }

    /// Typed records of a table; absent tables read as empty.
    pub async fn read_records<T: DeserializeOwned>(&self, table: TableName) -> SyncResult<Vec<T>> {
        let Some(envelope) = self.read(table).await? else {
            return Ok(Vec::new());
        };

        envelope
            .data
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .collect()
    }

    /// Replace a table's envelope wholesale, unless logout is in progress.
    pub async fn write(&self, table: TableName, envelope: &CacheEnvelope) -> SyncResult<WriteOutcome> {
        let value = serde_json::to_string(envelope)?;
        self.guarded_put(table.cache_key(), &value, None).await
    }

    /// Like [`write`](Self::write), but also suppressed when the guard has
    /// been raised at any point since `epoch` was read.
    pub async fn write_in_epoch(
        &self,
        table: TableName,
        envelope: &CacheEnvelope,
        epoch: u64,
    ) -> SyncResult<WriteOutcome> {
        let value = serde_json::to_string(envelope)?;
        self.guarded_put(table.cache_key(), &value, Some(epoch)).await
    }

    pub async fn set_auth_marker(&self, marker: &AuthMarker) -> SyncResult<WriteOutcome> {
        let value = serde_json::to_string(marker)?;
        self.guarded_put(AUTH_MARKER_KEY.to_string(), &value, None).await
    }

    pub async fn auth_marker(&self) -> SyncResult<Option<AuthMarker>> {
        match self.backend.get(AUTH_MARKER_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    async fn guarded_put(&self, key: String, value: &str, epoch: Option<u64>) -> SyncResult<WriteOutcome> {
        let _shared = self.guard.gate.read().await;

        if !self.guard.admits(epoch) {
            self.events.emit(SyncEvent::WriteSuppressedLogoutInProgress { key });
            return Ok(WriteOutcome::Suppressed);
        }

        self.backend.put(&key, value).await?;
        tracing::debug!(key = %key, bytes = value.len(), "Cache entry written");
        Ok(WriteOutcome::Written)
    }

    /// Remove every envelope and the authentication marker.
    ///
    /// Fails with [`SyncError::Storage`] when any key is still present after
    /// the backend reports a successful clear.
    pub async fn clear_all(&self) -> SyncResult<usize> {
        let removed = self.backend.clear().await?;
        let survivors = self.backend.keys().await?;
        if !survivors.is_empty() {
            tracing::warn!(survivors = ?survivors, "Cache entries survived clear");
            return Err(SyncError::Storage(format!(
                "{} cache entries survived clear",
                survivors.len()
            )));
        }
        tracing::debug!(removed, "Cache cleared");
        Ok(removed)
    }

    pub async fn clear_table(&self, table: TableName) -> SyncResult<bool> {
        self.backend.remove(&table.cache_key()).await
    }

    pub async fn status(&self, tables: &[TableName]) -> SyncResult<Vec<TableStatus>> {
        let mut statuses = Vec::with_capacity(tables.len());
        for &table in tables {
            let envelope = self.read(table).await?;
            statuses.push(TableStatus {
                table,
                records: envelope.as_ref().map(CacheEnvelope::len),
                fetched_at: envelope.map(|e| e.fetched_at),
            });
        }
        Ok(statuses)
    }
}

#[async_trait]
impl AuthStatus for CacheStore {
    async fn is_authenticated(&self) -> bool {
        if self.guard.is_raised() {
            return false;
        }
        matches!(self.auth_marker().await, Ok(Some(_)))
    }
}
