//! Sync orchestrator
//!
//! Runs fetch, validate, transform and write for a set of tables under a
//! single-flight lock. One table failing never aborts the run; the failure
//! is recorded and the next table is attempted. A run can be aborted
//! cooperatively through its cancellation token, which is checked before
//! each table and again immediately before each write.

use crate::cache::{CacheEnvelope, CacheStore, WriteOutcome};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::remote::RemoteDataProvider;
use crate::schema::{SchemaValidator, DEFAULT_SAMPLE_SIZE};
use crate::table::TableName;
use crate::transform::TransformerRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default bound on a single table fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Process-wide "sync in progress" flag. In-memory only.
#[derive(Debug, Clone, Default)]
pub struct SyncLock {
    held: Arc<AtomicBool>,
}

impl SyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free. Released when the guard drops.
    pub fn try_acquire(&self) -> Option<SyncLockGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncLockGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SyncLockGuard {
    held: Arc<AtomicBool>,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Where the current run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "table", rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Locked,
    Fetching(TableName),
    Validating(TableName),
    Transforming(TableName),
    Writing(TableName),
}

/// Counts for one successfully written table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub records: usize,
    pub filtered: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TableOutcome {
    Synced(TableStats),
    /// Fetched and transformed, but the write hit a raised logout guard.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableError {
    pub table: TableName,
    pub error: String,
    pub retryable: bool,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table, self.error)
    }
}

/// Outcome of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub success: bool,
    /// Tables written this run, in sync order.
    pub synced_tables: Vec<TableName>,
    pub errors: Vec<TableError>,
    /// Records written across all synced tables.
    pub total_records: usize,
    /// Records removed by the active-status filter.
    pub filtered_records: usize,
    /// Malformed records dropped during transformation.
    pub dropped_records: usize,
    pub suppressed_tables: Vec<TableName>,
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn begin(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            success: false,
            synced_tables: Vec::new(),
            errors: Vec::new(),
            total_records: 0,
            filtered_records: 0,
            dropped_records: 0,
            suppressed_tables: Vec::new(),
            aborted: false,
            started_at: now,
            finished_at: now,
        }
    }

    fn record_synced(&mut self, table: TableName, stats: TableStats) {
        self.synced_tables.push(table);
        self.total_records += stats.records;
        self.filtered_records += stats.filtered;
        self.dropped_records += stats.dropped;
    }

    pub fn error_for(&self, table: TableName) -> Option<&TableError> {
        self.errors.iter().find(|e| e.table == table)
    }
}

/// Resets run state when a run ends, however it ends.
struct ActiveRun<'a> {
    orchestrator: &'a SyncOrchestrator,
    token: CancellationToken,
    /// Logout guard epoch at lock time; writes from this run are only
    /// admitted while it is unchanged.
    epoch: u64,
    lock: Option<SyncLockGuard>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.orchestrator.current.lock().take();
        // Unlock before announcing Idle so an idle waiter can start a run.
        drop(self.lock.take());
        self.orchestrator.phase.send_replace(SyncPhase::Idle);
    }
}

pub struct SyncOrchestrator {
    provider: Arc<dyn RemoteDataProvider>,
    store: CacheStore,
    registry: TransformerRegistry,
    validator: SchemaValidator,
    events: Arc<dyn EventSink>,
    lock: SyncLock,
    phase: watch::Sender<SyncPhase>,
    current: Mutex<Option<CancellationToken>>,
    required_tables: Vec<TableName>,
    fetch_timeout: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        provider: Arc<dyn RemoteDataProvider>,
        store: CacheStore,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            provider,
            store,
            registry: TransformerRegistry::default(),
            validator: SchemaValidator::new(DEFAULT_SAMPLE_SIZE),
            events,
            lock: SyncLock::new(),
            phase,
            current: Mutex::new(None),
            required_tables: TableName::REQUIRED.to_vec(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_registry(mut self, registry: TransformerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_required_tables(mut self, tables: &[TableName]) -> Self {
        self.required_tables = TableName::canonical_order(tables);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.validator = SchemaValidator::new(sample_size);
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn required_tables(&self) -> &[TableName] {
        &self.required_tables
    }

    pub fn is_syncing(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Signal the in-flight run, if any, to stop. Returns whether one was running.
    pub fn abort_in_flight(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) => {
                token.cancel();
                tracing::info!("Abort signalled to in-flight sync");
                true
            }
            None => false,
        }
    }

    /// Wait up to `grace` for the current run to finish. Returns whether it did.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let mut phase = self.phase.subscribe();
        let idle = tokio::time::timeout(grace, phase.wait_for(|p| *p == SyncPhase::Idle)).await;
        matches!(idle, Ok(Ok(_)))
    }

    fn begin_run(&self) -> SyncResult<ActiveRun<'_>> {
        let lock = self.lock.try_acquire().ok_or(SyncError::SyncInProgress)?;

        // Epoch first: a raise landing after the flag check still bumps it.
        let guard = self.store.guard();
        let epoch = guard.epoch();
        if guard.is_raised() {
            return Err(SyncError::LogoutInProgress);
        }

        let token = CancellationToken::new();
        *self.current.lock() = Some(token.clone());
        self.phase.send_replace(SyncPhase::Locked);

        Ok(ActiveRun {
            orchestrator: self,
            token,
            epoch,
            lock: Some(lock),
        })
    }

    /// Sync `tables` in canonical order.
    ///
    /// Fails only with [`SyncError::SyncInProgress`] when another run holds
    /// the lock, or [`SyncError::LogoutInProgress`] while the logout guard is
    /// raised; per-table failures are reported in the [`SyncReport`].
    pub async fn sync_all(&self, tables: &[TableName]) -> SyncResult<SyncReport> {
        let run = match self.begin_run() {
            Ok(run) => run,
            Err(err) => {
                tracing::info!(error = %err, "Sync request rejected");
                return Err(err);
            }
        };

        let ordered = TableName::canonical_order(tables);
        let mut report = SyncReport::begin(Uuid::new_v4());
        self.events.emit(SyncEvent::SyncStarted {
            run_id: report.run_id,
            tables: ordered.clone(),
        });

        for &table in &ordered {
            if run.token.is_cancelled() {
                report.aborted = true;
                break;
            }

            match self.sync_one(table, &run).await {
                Ok(TableOutcome::Synced(stats)) => report.record_synced(table, stats),
                Ok(TableOutcome::Suppressed) => report.suppressed_tables.push(table),
                Err(SyncError::Cancelled) => {
                    report.aborted = true;
                    break;
                }
                Err(err) => {
                    self.events.emit(SyncEvent::SyncTableFailed {
                        run_id: report.run_id,
                        table,
                        error: err.to_string(),
                    });
                    report.errors.push(TableError {
                        table,
                        error: err.to_string(),
                        retryable: err.is_retryable(),
                    });
                }
            }
        }

        let required_synced = self
            .required_tables
            .iter()
            .filter(|t| ordered.contains(t))
            .all(|t| report.synced_tables.contains(t));
        report.success = !report.aborted
            && required_synced
            && (ordered.is_empty() || !report.synced_tables.is_empty());
        report.finished_at = Utc::now();

        if report.aborted {
            tracing::warn!(run_id = %report.run_id, "Sync aborted");
        }
        self.events.emit(SyncEvent::SyncCompleted {
            report: report.clone(),
        });

        Ok(report)
    }

    /// Sync a single table under the same lock as [`sync_all`](Self::sync_all).
    pub async fn sync_table(&self, table: TableName) -> SyncResult<TableOutcome> {
        let run = self.begin_run()?;
        let run_id = Uuid::new_v4();
        self.events.emit(SyncEvent::SyncStarted {
            run_id,
            tables: vec![table],
        });

        let outcome = self.sync_one(table, &run).await;
        if let Err(err) = &outcome {
            if !matches!(err, SyncError::Cancelled) {
                self.events.emit(SyncEvent::SyncTableFailed {
                    run_id,
                    table,
                    error: err.to_string(),
                });
            }
        }
        outcome
    }

    async fn sync_one(&self, table: TableName, run: &ActiveRun<'_>) -> SyncResult<TableOutcome> {
        let transformer = self.registry.get(table)?;

        self.phase.send_replace(SyncPhase::Fetching(table));
        // Envelopes are replaced wholesale, so every fetch is a full fetch.
        let rows = match tokio::time::timeout(self.fetch_timeout, self.provider.fetch_table(table, None)).await {
            Ok(rows) => rows?,
            Err(_) => return Err(SyncError::Timeout(self.fetch_timeout)),
        };

        self.phase.send_replace(SyncPhase::Validating(table));
        let validation = self.validator.check(&rows, &transformer.expected_shape());
        if !validation.compatible {
            self.events.emit(SyncEvent::SchemaDrift {
                table,
                drift: validation.breaking().cloned().collect(),
            });
        }

        self.phase.send_replace(SyncPhase::Transforming(table));
        let batch = transformer.transform_batch(&rows)?;
        for reason in &batch.dropped {
            self.events.emit(SyncEvent::RecordDropped {
                table,
                reason: reason.clone(),
            });
        }
        if batch.all_dropped() {
            return Err(SyncError::Transform(format!(
                "all {} records failed transformation",
                batch.received()
            )));
        }

        let stats = TableStats {
            records: batch.records.len(),
            filtered: batch.inactive,
            dropped: batch.dropped.len(),
        };
        let envelope = CacheEnvelope::seal(batch.records)?;

        if run.token.is_cancelled() {
            tracing::debug!(table = %table, "Skipping write for aborted run");
            return Err(SyncError::Cancelled);
        }

        self.phase.send_replace(SyncPhase::Writing(table));
        match self.store.write_in_epoch(table, &envelope, run.epoch).await? {
            WriteOutcome::Written => {
                tracing::debug!(
                    table = %table,
                    records = stats.records,
                    filtered = stats.filtered,
                    dropped = stats.dropped,
                    "Table synced"
                );
                Ok(TableOutcome::Synced(stats))
            }
            WriteOutcome::Suppressed => Ok(TableOutcome::Suppressed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::test_support::{RecordingSink, ScriptedProvider};
    use serde_json::{json, Value};

    struct Harness {
        orchestrator: Arc<SyncOrchestrator>,
        provider: Arc<ScriptedProvider>,
        sink: Arc<RecordingSink>,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let provider = Arc::new(provider);
        let sink = Arc::new(RecordingSink::default());
        let store = CacheStore::new(Arc::new(MemoryBackend::new()), sink.clone());
        let orchestrator = SyncOrchestrator::new(provider.clone(), store, sink.clone())
            .with_fetch_timeout(Duration::from_millis(500));
        Harness {
            orchestrator: Arc::new(orchestrator),
            provider,
            sink,
        }
    }

    fn attendees(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"id": format!("a{}", i), "first_name": "Test", "last_name": format!("{:03}", i), "is_active": true}))
            .collect()
    }

    fn agenda(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"id": format!("s{}", i), "title": format!("Session {}", i), "is_active": true}))
            .collect()
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let lock = SyncLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_locked());
        assert!(lock.try_acquire().is_none());

        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Attendees, attendees(60))
                .rows(TableName::AgendaItems, agenda(40))
                .fail(TableName::DiningOptions, "connection reset"),
        );

        let report = h
            .orchestrator
            .sync_all(&[TableName::DiningOptions, TableName::Attendees, TableName::AgendaItems])
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.synced_tables, vec![TableName::Attendees, TableName::AgendaItems]);
        assert_eq!(report.total_records, 100);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0].to_string(),
            "dining_options: Network error: connection reset"
        );
        assert!(report.errors[0].retryable);
        assert_eq!(
            h.provider.calls(),
            vec![TableName::Attendees, TableName::AgendaItems, TableName::DiningOptions]
        );
        assert_eq!(h.sink.count("sync_table_failed"), 1);
        assert_eq!(h.sink.count("sync_completed"), 1);
        assert!(h.orchestrator.store().read(TableName::DiningOptions).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_table_keeps_previous_envelope() {
        let h = harness(ScriptedProvider::new().rows(TableName::Sponsors, vec![
            json!({"id": "1", "name": "Acme", "is_active": true}),
        ]));
        h.orchestrator.sync_all(&[TableName::Sponsors]).await.unwrap();

        let failing = ScriptedProvider::new().fail(TableName::Sponsors, "offline");
        let orchestrator = SyncOrchestrator::new(
            Arc::new(failing),
            h.orchestrator.store().clone(),
            h.sink.clone(),
        );
        let report = orchestrator.sync_all(&[TableName::Sponsors]).await.unwrap();

        assert!(!report.success);
        let stale = h.orchestrator.store().read(TableName::Sponsors).await.unwrap().unwrap();
        assert_eq!(stale.len(), 1);
    }

    #[tokio::test]
    async fn test_required_table_failure_fails_run() {
        let h = harness(
            ScriptedProvider::new()
                .fail(TableName::AgendaItems, "502")
                .rows(TableName::Hotels, vec![json!({"id": "h", "name": "Inn", "is_active": true})]),
        );

        let report = h
            .orchestrator
            .sync_all(&[TableName::AgendaItems, TableName::Hotels])
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.synced_tables, vec![TableName::Hotels]);
    }

    #[tokio::test]
    async fn test_inactive_records_never_written() {
        let h = harness(ScriptedProvider::new().rows(
            TableName::AgendaItems,
            vec![
                json!({"id": "1", "is_active": false, "title": "Old Session"}),
                json!({"id": "2", "is_active": true, "title": "Keynote"}),
            ],
        ));

        let report = h.orchestrator.sync_all(&[TableName::AgendaItems]).await.unwrap();
        assert_eq!(report.filtered_records, 1);

        let envelope = h.orchestrator.store().read(TableName::AgendaItems).await.unwrap().unwrap();
        let ids: Vec<&str> = envelope.data.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[tokio::test]
    async fn test_concurrent_sync_rejected() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Sponsors, vec![json!({"id": "1", "name": "Acme", "is_active": true})])
                .delay(TableName::Sponsors, Duration::from_millis(100)),
        );

        let first = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_all(&[TableName::Sponsors]).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(h.orchestrator.is_syncing());
        let second = h.orchestrator.sync_all(&[TableName::Sponsors]).await;
        assert!(matches!(second, Err(SyncError::SyncInProgress)));
        assert!(matches!(
            h.orchestrator.sync_table(TableName::Sponsors).await,
            Err(SyncError::SyncInProgress)
        ));

        let report = first.await.unwrap().unwrap();
        assert_eq!(report.synced_tables, vec![TableName::Sponsors]);
        assert_eq!(h.provider.calls(), vec![TableName::Sponsors]);
        assert_eq!(h.sink.count("sync_started"), 1);
        assert!(!h.orchestrator.is_syncing());
        assert_eq!(h.orchestrator.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_table_failure() {
        let h = harness(
            ScriptedProvider::new()
                .delay(TableName::Hotels, Duration::from_secs(5))
                .rows(TableName::Attendees, attendees(2))
                .rows(TableName::AgendaItems, agenda(2)),
        );

        let report = h
            .orchestrator
            .sync_all(&[TableName::Attendees, TableName::AgendaItems, TableName::Hotels])
            .await
            .unwrap();

        assert!(report.success);
        let error = report.error_for(TableName::Hotels).unwrap();
        assert_eq!(error.error, "Fetch timed out after 500ms");
    }

    #[tokio::test]
    async fn test_abort_skips_write_and_remaining_tables() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Attendees, attendees(3))
                .delay(TableName::Attendees, Duration::from_millis(80))
                .rows(TableName::AgendaItems, agenda(3)),
        );

        let run = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_all(&TableName::ALL).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.orchestrator.phase(), SyncPhase::Fetching(TableName::Attendees));
        assert!(h.orchestrator.abort_in_flight());

        let report = run.await.unwrap().unwrap();
        assert!(report.aborted);
        assert!(!report.success);
        assert!(report.synced_tables.is_empty());
        assert_eq!(h.provider.calls(), vec![TableName::Attendees]);
        assert!(h.orchestrator.store().read(TableName::Attendees).await.unwrap().is_none());
        assert!(!h.orchestrator.abort_in_flight());
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let h = harness(
            ScriptedProvider::new().delay(TableName::Hotels, Duration::from_millis(50)),
        );
        assert!(h.orchestrator.wait_idle(Duration::from_millis(1)).await);

        let run = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_all(&[TableName::Hotels]).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(!h.orchestrator.wait_idle(Duration::from_millis(5)).await);
        assert!(h.orchestrator.wait_idle(Duration::from_secs(2)).await);
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_write_suppressed_when_guard_raised() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Sponsors, vec![json!({"id": "1", "name": "Acme", "is_active": true})])
                .delay(TableName::Sponsors, Duration::from_millis(40)),
        );

        let run = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_all(&[TableName::Sponsors]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.orchestrator.store().guard().raise().await;

        let report = run.await.unwrap().unwrap();

        assert_eq!(report.suppressed_tables, vec![TableName::Sponsors]);
        assert!(report.synced_tables.is_empty());
        assert!(report.errors.is_empty());
        assert_eq!(h.sink.count("write_suppressed_logout_in_progress"), 1);
    }

    #[tokio::test]
    async fn test_run_rejected_while_guard_raised() {
        let h = harness(ScriptedProvider::new().rows(TableName::Sponsors, vec![
            json!({"id": "1", "name": "Acme", "is_active": true}),
        ]));
        let guard = h.orchestrator.store().guard();
        guard.raise().await;

        assert!(matches!(
            h.orchestrator.sync_all(&[TableName::Sponsors]).await,
            Err(SyncError::LogoutInProgress)
        ));
        assert!(matches!(
            h.orchestrator.sync_table(TableName::Sponsors).await,
            Err(SyncError::LogoutInProgress)
        ));
        assert!(!h.orchestrator.is_syncing());
        assert_eq!(h.orchestrator.phase(), SyncPhase::Idle);

        h.orchestrator.store().clear_all().await.unwrap();
        guard.lower();

        // Nothing from the rejected runs surfaces after the clear.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.provider.calls().is_empty());
        assert!(h.orchestrator.store().read(TableName::Sponsors).await.unwrap().is_none());
        assert_eq!(h.sink.count("sync_started"), 0);
    }

    #[tokio::test]
    async fn test_sync_table_reports_start_and_failure() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Sponsors, vec![json!({"id": "1", "name": "Acme", "is_active": true})])
                .fail(TableName::Hotels, "offline"),
        );

        h.orchestrator.sync_table(TableName::Sponsors).await.unwrap();
        assert_eq!(h.sink.count("sync_started"), 1);
        assert_eq!(h.sink.count("sync_table_failed"), 0);

        assert!(h.orchestrator.sync_table(TableName::Hotels).await.is_err());
        assert_eq!(h.sink.count("sync_started"), 2);
        assert_eq!(h.sink.count("sync_table_failed"), 1);
    }

    #[tokio::test]
    async fn test_lock_released_once_idle_observed() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Sponsors, vec![json!({"id": "1", "name": "Acme", "is_active": true})])
                .delay(TableName::Sponsors, Duration::from_millis(30)),
        );

        let run = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_all(&[TableName::Sponsors]).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(h.orchestrator.wait_idle(Duration::from_secs(2)).await);
        assert!(!h.orchestrator.is_syncing());
        let next = h.orchestrator.sync_all(&[TableName::Sponsors]).await.unwrap();
        assert_eq!(next.synced_tables, vec![TableName::Sponsors]);
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_spanning_logout_never_writes() {
        let h = harness(
            ScriptedProvider::new()
                .rows(TableName::Sponsors, vec![json!({"id": "1", "name": "Acme", "is_active": true})])
                .delay(TableName::Sponsors, Duration::from_millis(80)),
        );

        let run = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.sync_all(&[TableName::Sponsors]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A full logout cycle completes while the fetch is still pending.
        let guard = h.orchestrator.store().guard();
        guard.raise().await;
        h.orchestrator.store().clear_all().await.unwrap();
        guard.lower();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.suppressed_tables, vec![TableName::Sponsors]);
        assert!(h.orchestrator.store().read(TableName::Sponsors).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_records_dropped_is_table_failure() {
        let h = harness(ScriptedProvider::new().rows(
            TableName::Hotels,
            vec![json!({"name": "No id", "is_active": true}), json!(42)],
        ));

        let report = h.orchestrator.sync_all(&[TableName::Hotels]).await.unwrap();

        assert!(report.synced_tables.is_empty());
        assert!(report.errors[0].error.starts_with("Transform error"));
        assert_eq!(h.sink.count("record_dropped"), 2);
    }

    #[tokio::test]
    async fn test_empty_fetch_writes_empty_envelope() {
        let h = harness(ScriptedProvider::new());

        let report = h.orchestrator.sync_all(&TableName::REQUIRED).await.unwrap();

        assert!(report.success);
        assert_eq!(report.total_records, 0);
        let envelope = h.orchestrator.store().read(TableName::Attendees).await.unwrap().unwrap();
        assert!(envelope.is_empty());
    }

    #[tokio::test]
    async fn test_schema_drift_reported_but_record_kept() {
        let h = harness(ScriptedProvider::new().rows(
            TableName::AgendaItems,
            vec![json!({
                "id": "9",
                "title": "Rust at Scale",
                "is_active": true,
                "speaker": {"name": "Ferris Crab"}
            })],
        ));

        let report = h.orchestrator.sync_all(&[TableName::AgendaItems]).await.unwrap();
        assert_eq!(report.total_records, 1);

        let drift = h
            .sink
            .events()
            .into_iter()
            .find_map(|e| match e {
                SyncEvent::SchemaDrift { table, drift } => Some((table, drift)),
                _ => None,
            })
            .unwrap();
        assert_eq!(drift.0, TableName::AgendaItems);
        assert!(drift.1.iter().any(|d| d.field == "speaker"));

        let envelope = h.orchestrator.store().read(TableName::AgendaItems).await.unwrap().unwrap();
        assert_eq!(envelope.data[0]["speaker"], "Ferris Crab");
    }

    #[tokio::test]
    async fn test_sync_table_outcome() {
        let h = harness(ScriptedProvider::new().rows(TableName::Hotels, vec![
            json!({"id": "h1", "name": "Grand", "is_active": true}),
            json!({"id": "h2", "name": "Closed", "is_active": false}),
        ]));

        let outcome = h.orchestrator.sync_table(TableName::Hotels).await.unwrap();
        assert_eq!(
            outcome,
            TableOutcome::Synced(TableStats { records: 1, filtered: 1, dropped: 0 })
        );
        assert!(!h.orchestrator.is_syncing());
    }
}
