//! Background sync scheduler
//!
//! Periodically re-syncs the configured tables. Every tick checks the
//! logout guard and the authentication status before touching the
//! orchestrator, so a tick that fires from a stale timer during logout, or
//! after the session ended, does nothing.

use crate::cache::LogoutGuard;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::table::TableName;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Whether a user session is currently established.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthStatus: Send + Sync {
    async fn is_authenticated(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tick", rename_all = "snake_case")]
pub enum TickOutcome {
    Completed { success: bool },
    SkippedLogoutInProgress,
    SkippedUnauthenticated,
    /// Another run held the sync lock.
    SkippedBusy,
    Failed,
}

/// Counters for scheduler activity since construction.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub ticks: AtomicU64,
    pub syncs: AtomicU64,
    pub skipped: AtomicU64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub ticks: u64,
    pub syncs: u64,
    pub skipped: u64,
}

struct TickRunner {
    orchestrator: Arc<SyncOrchestrator>,
    auth: Arc<dyn AuthStatus>,
    guard: LogoutGuard,
    tables: Vec<TableName>,
    metrics: SchedulerMetrics,
}

impl TickRunner {
    async fn tick(&self) -> TickOutcome {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);

        if self.guard.is_raised() {
            self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Background tick skipped, logout in progress");
            return TickOutcome::SkippedLogoutInProgress;
        }
        if !self.auth.is_authenticated().await {
            self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Background tick skipped, not authenticated");
            return TickOutcome::SkippedUnauthenticated;
        }

        match self.orchestrator.sync_all(&self.tables).await {
            Ok(report) => {
                self.metrics.syncs.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Completed {
                    success: report.success,
                }
            }
            Err(SyncError::SyncInProgress) => {
                self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Background tick skipped, sync already in progress");
                TickOutcome::SkippedBusy
            }
            Err(SyncError::LogoutInProgress) => {
                self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Background tick skipped, logout started before the run");
                TickOutcome::SkippedLogoutInProgress
            }
            Err(err) => {
                tracing::warn!(error = %err, "Background sync failed");
                TickOutcome::Failed
            }
        }
    }
}

struct RunningTask {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct BackgroundSyncScheduler {
    runner: Arc<TickRunner>,
    task: Mutex<Option<RunningTask>>,
}

impl BackgroundSyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        auth: Arc<dyn AuthStatus>,
        tables: &[TableName],
    ) -> Self {
        let guard = orchestrator.store().guard().clone();
        Self {
            runner: Arc::new(TickRunner {
                orchestrator,
                auth,
                guard,
                tables: TableName::canonical_order(tables),
                metrics: SchedulerMetrics::default(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start ticking every `period`, first tick one period from now.
    ///
    /// Restarts the timer if already running.
    pub fn start(&self, period: Duration) -> SyncResult<()> {
        if period.is_zero() {
            return Err(SyncError::InvalidOperation(
                "Background sync interval must be greater than zero".to_string(),
            ));
        }

        let stop = CancellationToken::new();
        let runner = Arc::clone(&self.runner);
        let stopped = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        runner.tick().await;
                    }
                }
            }

            tracing::debug!("Background sync loop exited");
        });

        if let Some(previous) = self.task.lock().replace(RunningTask { stop, handle }) {
            previous.stop.cancel();
        }

        tracing::info!(interval_ms = period.as_millis() as u64, "Background sync started");
        Ok(())
    }

    /// Stop the timer. A tick already running finishes; no new tick starts.
    /// Returns whether the scheduler was running.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(task) => {
                task.stop.cancel();
                let was_running = !task.handle.is_finished();
                tracing::info!("Background sync stopped");
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.stop.is_cancelled() && !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Run one tick now, with the same checks as a timer tick.
    pub async fn tick_once(&self) -> TickOutcome {
        self.runner.tick().await
    }

    pub fn metrics(&self) -> SchedulerSnapshot {
        self.runner.metrics.snapshot()
    }
}

impl Drop for BackgroundSyncScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.stop.cancel();
        }
    }
}
