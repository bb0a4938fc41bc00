//! Offline-first sync and cache lifecycle engine for the conference companion app
//!
//! Provides:
//! - Per-table transformers that normalize server rows into stable records
//! - Schema drift detection on fetched rows
//! - A checksummed envelope cache over SQLite or memory
//! - Single-flight sync orchestration with cooperative abort
//! - Post-login sync, logout clearing and background re-sync

pub mod auth_gate;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod logout;
pub mod orchestrator;
pub mod remote;
pub mod scheduler;
pub mod schema;
pub mod table;
pub mod transform;

#[cfg(test)]
mod test_support;

pub use auth_gate::{AuthEvent, AuthSyncGate, AuthSyncReport, Identity};
pub use cache::{
    AuthMarker, CacheBackend, CacheEnvelope, CacheStore, LogoutGuard, MemoryBackend,
    SqliteBackend, StorageConfig, TableStatus, WriteOutcome,
};
pub use config::SyncEngineConfig;
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, EventSink, SyncEvent};
pub use logout::{ClearPhase, ClearReason, ClearReport, DataClearingGuard};
pub use orchestrator::{SyncOrchestrator, SyncPhase, SyncReport, TableError, TableOutcome};
pub use remote::{HttpRemoteProvider, RemoteConfig, RemoteDataProvider};
pub use scheduler::{AuthStatus, BackgroundSyncScheduler, SchedulerSnapshot, TickOutcome};
pub use table::TableName;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What the engine did in response to an [`AuthEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthEventOutcome {
    Synced(AuthSyncReport),
    Cleared(ClearReport),
}

/// Sync engine wiring every component over one cache store
pub struct SyncEngine {
    config: SyncEngineConfig,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: Arc<BackgroundSyncScheduler>,
    gate: AuthSyncGate,
    clearing: DataClearingGuard,
    events: EventBus,
}

impl SyncEngine {
    /// Assemble an engine from explicit collaborators.
    pub fn new(
        config: SyncEngineConfig,
        provider: Arc<dyn RemoteDataProvider>,
        backend: Arc<dyn CacheBackend>,
        events: EventBus,
    ) -> SyncResult<Self> {
        config.validate()?;

        let sink: Arc<dyn EventSink> = Arc::new(events.clone());
        let store = CacheStore::new(backend, Arc::clone(&sink));
        let orchestrator = Arc::new(
            SyncOrchestrator::new(provider, store.clone(), Arc::clone(&sink))
                .with_required_tables(&config.required_tables)
                .with_fetch_timeout(config.fetch_timeout)
                .with_sample_size(config.schema_sample_size),
        );
        let scheduler = Arc::new(BackgroundSyncScheduler::new(
            Arc::clone(&orchestrator),
            Arc::new(store),
            &config.tables,
        ));
        let gate = AuthSyncGate::new(Arc::clone(&orchestrator), &config.tables);
        let clearing = DataClearingGuard::new(Arc::clone(&orchestrator), sink)
            .with_scheduler(Arc::clone(&scheduler))
            .with_abort_grace(config.abort_grace);

        Ok(Self {
            config,
            orchestrator,
            scheduler,
            gate,
            clearing,
            events,
        })
    }

    /// Open the on-device SQLite cache and the HTTP provider described by `config`.
    pub async fn open(config: SyncEngineConfig) -> SyncResult<Self> {
        config.validate()?;
        let backend = SqliteBackend::open(&config.storage).await?;
        let provider = HttpRemoteProvider::new(&config.remote)?;
        Self::new(config, Arc::new(provider), Arc::new(backend), EventBus::default())
    }

    /// React to the outcome of an authentication attempt.
    pub async fn handle_auth_event(&self, event: AuthEvent) -> AuthEventOutcome {
        match event {
            AuthEvent::AuthSucceeded { identity } => {
                AuthEventOutcome::Synced(self.on_authenticated(&identity).await)
            }
            AuthEvent::AuthFailed { reason } => {
                tracing::warn!(reason = %reason, "Authentication failed, clearing cached data");
                AuthEventOutcome::Cleared(self.clear(ClearReason::AuthFailure).await)
            }
        }
    }

    async fn on_authenticated(&self, identity: &Identity) -> AuthSyncReport {
        let marker = AuthMarker::new(identity.user_id.clone());
        match self.store().set_auth_marker(&marker).await {
            Ok(WriteOutcome::Written) => {}
            Ok(WriteOutcome::Suppressed) => {
                tracing::warn!(user_id = %identity.user_id, "Auth marker not written, logout in progress");
            }
            Err(err) => {
                tracing::warn!(user_id = %identity.user_id, error = %err, "Failed to write auth marker");
            }
        }

        let report = self.gate.sync_after_authentication(identity).await;

        if let Some(interval) = self.config.background_interval {
            if let Err(err) = self.scheduler.start(interval) {
                tracing::warn!(error = %err, "Background sync not started");
            }
        }

        report
    }

    /// Clear every cached trace of the session.
    pub async fn logout(&self) -> ClearReport {
        self.clear(ClearReason::Logout).await
    }

    pub async fn clear(&self, reason: ClearReason) -> ClearReport {
        self.clearing.handle_logout_or_auth_failure(reason).await
    }

    /// Sync `tables` now, or every configured table when empty.
    pub async fn sync_now(&self, tables: &[TableName]) -> SyncResult<SyncReport> {
        let tables = if tables.is_empty() {
            &self.config.tables[..]
        } else {
            tables
        };
        self.orchestrator.sync_all(tables).await
    }

    /// Presence summary of every configured table.
    pub async fn status(&self) -> SyncResult<Vec<TableStatus>> {
        self.store().status(&self.config.tables).await
    }

    /// Stop background work. Cached data is kept.
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    pub fn store(&self) -> &CacheStore {
        self.orchestrator.store()
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &Arc<BackgroundSyncScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// Subscribe to lifecycle events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}
