//! Structured sync lifecycle events
//!
//! Events are fire-and-forget: the engine never consumes a return value from
//! a sink. [`EventBus`] logs every event through `tracing` and fans it out to
//! UI subscribers over a broadcast channel.

use crate::logout::ClearReport;
use crate::orchestrator::SyncReport;
use crate::schema::FieldDrift;
use crate::table::TableName;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default number of events buffered per subscriber before lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    SyncStarted {
        run_id: Uuid,
        tables: Vec<TableName>,
    },
    SyncTableFailed {
        run_id: Uuid,
        table: TableName,
        error: String,
    },
    SchemaDrift {
        table: TableName,
        drift: Vec<FieldDrift>,
    },
    RecordDropped {
        table: TableName,
        reason: String,
    },
    SyncCompleted {
        report: SyncReport,
    },
    WriteSuppressedLogoutInProgress {
        key: String,
    },
    CacheEntryCorrupted {
        key: String,
    },
    CacheCleared {
        report: ClearReport,
    },
}

impl SyncEvent {
    /// Stable event name used by telemetry consumers.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SyncStarted { .. } => "sync_started",
            SyncEvent::SyncTableFailed { .. } => "sync_table_failed",
            SyncEvent::SchemaDrift { .. } => "schema_drift_warning",
            SyncEvent::RecordDropped { .. } => "record_dropped",
            SyncEvent::SyncCompleted { .. } => "sync_completed",
            SyncEvent::WriteSuppressedLogoutInProgress { .. } => {
                "write_suppressed_logout_in_progress"
            }
            SyncEvent::CacheEntryCorrupted { .. } => "cache_entry_corrupted",
            SyncEvent::CacheCleared { .. } => "cache_cleared",
        }
    }
}

/// Receiver of sync lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Tracing-backed event sink with broadcast fan-out.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    fn log(event: &SyncEvent) {
        let name = event.name();
        match event {
            SyncEvent::SyncStarted { run_id, tables } => {
                tracing::info!(event = name, run_id = %run_id, tables = tables.len(), "Sync started");
            }
            SyncEvent::SyncTableFailed { run_id, table, error } => {
                tracing::warn!(event = name, run_id = %run_id, table = %table, error = %error, "Table sync failed");
            }
            SyncEvent::SchemaDrift { table, drift } => {
                tracing::warn!(event = name, table = %table, drift = ?drift, "Schema drift detected");
            }
            SyncEvent::RecordDropped { table, reason } => {
                tracing::warn!(event = name, table = %table, reason = %reason, "Dropped malformed record");
            }
            SyncEvent::SyncCompleted { report } => {
                tracing::info!(
                    event = name,
                    run_id = %report.run_id,
                    success = report.success,
                    synced = report.synced_tables.len(),
                    failed = report.errors.len(),
                    total_records = report.total_records,
                    "Sync completed"
                );
            }
            SyncEvent::WriteSuppressedLogoutInProgress { key } => {
                tracing::info!(event = name, key = %key, "Cache write suppressed, logout in progress");
            }
            SyncEvent::CacheEntryCorrupted { key } => {
                tracing::warn!(event = name, key = %key, "Discarded corrupted cache entry");
            }
            SyncEvent::CacheCleared { report } => {
                tracing::info!(
                    event = name,
                    reason = ?report.reason,
                    entries_removed = report.entries_removed,
                    cleared = report.cleared,
                    "Cache cleared"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: SyncEvent) {
        Self::log(&event);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
