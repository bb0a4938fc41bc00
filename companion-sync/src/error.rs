//! Error types for the sync engine

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Fetch timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage quota exceeded: needed {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Logout in progress")]
    LogoutInProgress,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the caller can reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Timeout(_)
                | SyncError::Storage(_)
                | SyncError::Database(_)
                | SyncError::QuotaExceeded { .. }
                | SyncError::SyncInProgress
                | SyncError::LogoutInProgress
        )
    }

    /// Errors raised by the persistence layer rather than the network or data.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            SyncError::Storage(_) | SyncError::Database(_) | SyncError::QuotaExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
