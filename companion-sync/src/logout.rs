//! Data clearing on logout and authentication failure
//!
//! Step order matters and is fixed: stop the background timer, abort the
//! in-flight run, raise the logout guard, clear storage, lower the guard.
//! Failures in the first two steps are recorded but never prevent the
//! clear; the raised guard alone keeps late writes out.

use crate::cache::{CacheStore, LogoutGuard};
use crate::events::{EventSink, SyncEvent};
use crate::orchestrator::SyncOrchestrator;
use crate::scheduler::BackgroundSyncScheduler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Default wait for an aborted run to release the sync lock.
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    Logout,
    AuthFailure,
    /// Operator-requested wipe.
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearPhase {
    Active,
    StoppingBackgroundOps,
    AbortingInFlightSync,
    GuardRaised,
    Clearing,
    GuardLowered,
    Clean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearReport {
    pub reason: ClearReason,
    /// Phases passed through, in order.
    pub phases: Vec<ClearPhase>,
    pub scheduler_was_running: bool,
    pub in_flight_aborted: bool,
    /// The aborted run was still holding the lock when the grace ran out.
    pub abort_grace_expired: bool,
    pub entries_removed: usize,
    pub cleared: bool,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Lowers the guard when dropped, so a cancelled clear cannot leave it up.
struct RaisedGuard<'a>(&'a LogoutGuard);

impl Drop for RaisedGuard<'_> {
    fn drop(&mut self) {
        self.0.lower();
    }
}

pub struct DataClearingGuard {
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: Option<Arc<BackgroundSyncScheduler>>,
    store: CacheStore,
    events: Arc<dyn EventSink>,
    abort_grace: Duration,
    serial: Mutex<()>,
}

impl DataClearingGuard {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, events: Arc<dyn EventSink>) -> Self {
        let store = orchestrator.store().clone();
        Self {
            orchestrator,
            scheduler: None,
            store,
            events,
            abort_grace: DEFAULT_ABORT_GRACE,
            serial: Mutex::new(()),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<BackgroundSyncScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    /// Tear down every trace of the session. Always completes; problems
    /// are reported in the returned [`ClearReport`].
    ///
    /// Concurrent calls are serialized.
    pub async fn handle_logout_or_auth_failure(&self, reason: ClearReason) -> ClearReport {
        let _serial = self.serial.lock().await;

        let mut report = ClearReport {
            reason,
            phases: vec![ClearPhase::Active],
            scheduler_was_running: false,
            in_flight_aborted: false,
            abort_grace_expired: false,
            entries_removed: 0,
            cleared: false,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        tracing::info!(reason = ?reason, "Clearing cached data");

        report.phases.push(ClearPhase::StoppingBackgroundOps);
        if let Some(scheduler) = &self.scheduler {
            report.scheduler_was_running = scheduler.stop();
        }

        report.phases.push(ClearPhase::AbortingInFlightSync);
        report.in_flight_aborted = self.orchestrator.abort_in_flight();
        if report.in_flight_aborted && !self.orchestrator.wait_idle(self.abort_grace).await {
            report.abort_grace_expired = true;
            let message = format!(
                "in-flight sync still running after {}ms",
                self.abort_grace.as_millis()
            );
            tracing::warn!(error = %message, "Proceeding with clear");
            report.errors.push(message);
        }

        let guard = self.store.guard();
        guard.raise().await;
        let raised = RaisedGuard(guard);
        report.phases.push(ClearPhase::GuardRaised);

        report.phases.push(ClearPhase::Clearing);
        match self.store.clear_all().await {
            Ok(removed) => {
                report.entries_removed = removed;
                report.cleared = true;
            }
            Err(first) => {
                tracing::warn!(error = %first, "Cache clear failed, retrying once");
                report.errors.push(first.to_string());
                match self.store.clear_all().await {
                    Ok(removed) => {
                        report.entries_removed = removed;
                        report.cleared = true;
                    }
                    Err(second) => {
                        tracing::error!(error = %second, "Cache clear failed");
                        report.errors.push(second.to_string());
                    }
                }
            }
        }

        drop(raised);
        report.phases.push(ClearPhase::GuardLowered);
        if report.cleared {
            report.phases.push(ClearPhase::Clean);
        }

        report.finished_at = Utc::now();
        self.events.emit(SyncEvent::CacheCleared {
            report: report.clone(),
        });

        report
    }
}
