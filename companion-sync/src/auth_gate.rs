//! Post-login sync gate
//!
//! Runs once after authentication has already succeeded. A failed sync is
//! reported but never undoes the login: authentication and data
//! availability are separate failure domains, and the data can be synced
//! again later.

use crate::orchestrator::{SyncOrchestrator, SyncReport};
use crate::table::TableName;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Authenticated user, as reported by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}

/// Outcome of an authentication attempt. The engine only reacts to these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    AuthSucceeded { identity: Identity },
    AuthFailed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSyncReport {
    pub user_id: String,
    /// Sync succeeded and every required table has a valid envelope.
    pub success: bool,
    /// At least one required table holds records.
    pub has_data: bool,
    pub sync: Option<SyncReport>,
    /// Required tables without a valid envelope after the sync.
    pub missing_tables: Vec<TableName>,
    pub error: Option<String>,
}

pub struct AuthSyncGate {
    orchestrator: Arc<SyncOrchestrator>,
    tables: Vec<TableName>,
}

impl AuthSyncGate {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, tables: &[TableName]) -> Self {
        Self {
            orchestrator,
            tables: TableName::canonical_order(tables),
        }
    }

    /// Sync the full table set for a freshly authenticated user, then check
    /// that the required tables actually landed in the cache.
    pub async fn sync_after_authentication(&self, identity: &Identity) -> AuthSyncReport {
        tracing::info!(user_id = %identity.user_id, tables = self.tables.len(), "Post-login sync");

        let mut report = AuthSyncReport {
            user_id: identity.user_id.clone(),
            success: false,
            has_data: false,
            sync: None,
            missing_tables: Vec::new(),
            error: None,
        };

        let sync_ok = match self.orchestrator.sync_all(&self.tables).await {
            Ok(sync) => {
                let ok = sync.success;
                report.sync = Some(sync);
                ok
            }
            Err(err) => {
                report.error = Some(err.to_string());
                false
            }
        };

        let store = self.orchestrator.store();
        for &table in self.orchestrator.required_tables() {
            match store.read(table).await {
                Ok(Some(envelope)) => report.has_data |= !envelope.is_empty(),
                Ok(None) => report.missing_tables.push(table),
                Err(err) => {
                    report.missing_tables.push(table);
                    report.error.get_or_insert_with(|| err.to_string());
                }
            }
        }

        report.success = sync_ok && report.missing_tables.is_empty();
        if !report.success {
            tracing::warn!(
                user_id = %identity.user_id,
                missing = ?report.missing_tables,
                error = ?report.error,
                "Post-login sync incomplete; login stands, sync can be retried"
            );
        }

        report
    }
}
