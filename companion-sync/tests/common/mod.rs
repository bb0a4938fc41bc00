//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use companion_sync::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Remote provider answering from per-table fixtures.
#[derive(Default)]
pub struct FakeRemote {
    rows: Mutex<HashMap<TableName, Vec<Value>>>,
    failures: Mutex<HashMap<TableName, String>>,
    latency: Mutex<HashMap<TableName, Duration>>,
    fetches: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: TableName, rows: Vec<Value>) -> Self {
        self.rows.lock().insert(table, rows);
        self
    }

    pub fn with_failure(self, table: TableName, message: &str) -> Self {
        self.failures.lock().insert(table, message.to_string());
        self
    }

    pub fn with_latency(self, table: TableName, latency: Duration) -> Self {
        self.latency.lock().insert(table, latency);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteDataProvider for FakeRemote {
    async fn fetch_table(
        &self,
        table: TableName,
        _since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency.lock().get(&table).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.failures.lock().get(&table).cloned() {
            return Err(SyncError::Network(message));
        }
        Ok(self.rows.lock().get(&table).cloned().unwrap_or_default())
    }
}

/// Memory backend that counts successful puts.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    puts: AtomicUsize,
    clear_delay: Duration,
}

impl CountingBackend {
    /// Hold every clear for `delay` before removing anything.
    pub fn with_clear_delay(mut self, delay: Duration) -> Self {
        self.clear_delay = delay;
        self
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for CountingBackend {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> SyncResult<()> {
        self.inner.put(key, value).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> SyncResult<bool> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> SyncResult<usize> {
        if !self.clear_delay.is_zero() {
            tokio::time::sleep(self.clear_delay).await;
        }
        self.inner.clear().await
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        self.inner.keys().await
    }
}

pub struct Harness {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub backend: Arc<CountingBackend>,
    pub events: EventBus,
}

impl Harness {
    pub fn new(remote: FakeRemote) -> Self {
        let backend = Arc::new(CountingBackend::default());
        let events = EventBus::default();
        let store = CacheStore::new(backend.clone(), Arc::new(events.clone()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(remote),
            store,
            Arc::new(events.clone()),
        ));
        Self {
            orchestrator,
            backend,
            events,
        }
    }

    pub fn store(&self) -> &CacheStore {
        self.orchestrator.store()
    }
}

/// Engine over memory storage with background sync disabled.
pub fn engine(remote: FakeRemote, abort_grace: Duration) -> SyncEngine {
    engine_with_backend(remote, Arc::new(MemoryBackend::new()), abort_grace)
}

pub fn engine_with_backend(
    remote: FakeRemote,
    backend: Arc<dyn CacheBackend>,
    abort_grace: Duration,
) -> SyncEngine {
    let config = SyncEngineConfig {
        background_interval: None,
        abort_grace,
        ..SyncEngineConfig::default()
    };
    SyncEngine::new(config, Arc::new(remote), backend, EventBus::default()).unwrap()
}

/// Every event currently buffered for `rx`.
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn attendee(id: usize, active: bool) -> Value {
    json!({
        "id": format!("att-{}", id),
        "first_name": "Attendee",
        "last_name": format!("{:04}", id),
        "email": format!("attendee{}@example.com", id),
        "is_active": active,
    })
}

pub fn agenda_item(id: usize, title: &str, active: bool) -> Value {
    json!({
        "id": format!("{}", id),
        "title": title,
        "date": "2026-06-01",
        "start_time": "09:00",
        "is_active": active,
    })
}

pub fn sponsor(id: usize, name: &str) -> Value {
    json!({"id": id, "name": name, "tier": "gold", "is_active": true})
}
