//! Engine configuration
//!
//! Defaults suit a device build; every field can be overridden from the
//! environment with the `COMPANION_SYNC_` prefix. Durations are expressed in
//! milliseconds both in serialized form and in the environment.

use crate::cache::StorageConfig;
use crate::error::{SyncError, SyncResult};
use crate::logout::DEFAULT_ABORT_GRACE;
use crate::orchestrator::DEFAULT_FETCH_TIMEOUT;
use crate::remote::RemoteConfig;
use crate::schema::DEFAULT_SAMPLE_SIZE;
use crate::table::TableName;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "COMPANION_SYNC_";

// Serialize Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod optional_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEngineConfig {
    /// Tables synced after login and on every background tick
    pub tables: Vec<TableName>,
    /// Tables that must sync for a run to count as successful
    pub required_tables: Vec<TableName>,
    /// Bound on a single table fetch
    #[serde(with = "duration_millis")]
    pub fetch_timeout: Duration,
    /// How long logout waits for an aborted run to let go of the lock
    #[serde(with = "duration_millis")]
    pub abort_grace: Duration,
    /// Background re-sync period; `None` disables the scheduler
    #[serde(with = "optional_duration_millis", default)]
    pub background_interval: Option<Duration>,
    /// Rows sampled per table for schema drift detection
    pub schema_sample_size: usize,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            tables: TableName::ALL.to_vec(),
            required_tables: TableName::REQUIRED.to_vec(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            abort_grace: DEFAULT_ABORT_GRACE,
            background_interval: Some(Duration::from_secs(300)),
            schema_sample_size: DEFAULT_SAMPLE_SIZE,
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> SyncResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SyncError::Configuration(format!("Invalid value for {}{}: {}", ENV_PREFIX, key, raw)))
}

fn parse_tables(raw: &str) -> SyncResult<Vec<TableName>> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(TableName::from_str)
        .collect()
}

impl SyncEngineConfig {
    /// Load from the process environment.
    ///
    /// # Environment Variables
    /// - `COMPANION_SYNC_TABLES`: comma-separated table names (default: all)
    /// - `COMPANION_SYNC_REQUIRED_TABLES`: comma-separated (default: attendees,agenda_items)
    /// - `COMPANION_SYNC_FETCH_TIMEOUT_MS` (default: 15000)
    /// - `COMPANION_SYNC_ABORT_GRACE_MS` (default: 2000)
    /// - `COMPANION_SYNC_BACKGROUND_INTERVAL_MS`: `0` disables (default: 300000)
    /// - `COMPANION_SYNC_SCHEMA_SAMPLE_SIZE` (default: 10)
    /// - `COMPANION_SYNC_DB_PATH`, `COMPANION_SYNC_DB_MAX_CONNECTIONS`,
    ///   `COMPANION_SYNC_DB_ENABLE_WAL`, `COMPANION_SYNC_DB_SECURE_DELETE`
    /// - `COMPANION_SYNC_API_URL`, `COMPANION_SYNC_API_TOKEN`,
    ///   `COMPANION_SYNC_API_TIMEOUT_MS`
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Load from an arbitrary key lookup; keys are given without the prefix.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("TABLES") {
            config.tables = parse_tables(&raw)?;
        }
        if let Some(raw) = lookup("REQUIRED_TABLES") {
            config.required_tables = parse_tables(&raw)?;
        }
        if let Some(raw) = lookup("FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(parse_value("FETCH_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("ABORT_GRACE_MS") {
            config.abort_grace = Duration::from_millis(parse_value("ABORT_GRACE_MS", &raw)?);
        }
        if let Some(raw) = lookup("BACKGROUND_INTERVAL_MS") {
            let millis: u64 = parse_value("BACKGROUND_INTERVAL_MS", &raw)?;
            config.background_interval = (millis > 0).then(|| Duration::from_millis(millis));
        }
        if let Some(raw) = lookup("SCHEMA_SAMPLE_SIZE") {
            config.schema_sample_size = parse_value("SCHEMA_SAMPLE_SIZE", &raw)?;
        }

        if let Some(path) = lookup("DB_PATH") {
            config.storage.db_path = path;
        }
        if let Some(raw) = lookup("DB_MAX_CONNECTIONS") {
            config.storage.max_connections = parse_value("DB_MAX_CONNECTIONS", &raw)?;
        }
        if let Some(raw) = lookup("DB_ENABLE_WAL") {
            config.storage.enable_wal = parse_value("DB_ENABLE_WAL", &raw)?;
        }
        if let Some(raw) = lookup("DB_SECURE_DELETE") {
            config.storage.enable_secure_delete = parse_value("DB_SECURE_DELETE", &raw)?;
        }

        if let Some(url) = lookup("API_URL") {
            config.remote.base_url = url;
        }
        if let Some(token) = lookup("API_TOKEN") {
            config.remote.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(raw) = lookup("API_TIMEOUT_MS") {
            config.remote.request_timeout = Duration::from_millis(parse_value("API_TIMEOUT_MS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.tables.is_empty() {
            return Err(SyncError::Configuration("At least one table must be synced".to_string()));
        }
        if let Some(table) = self.required_tables.iter().find(|t| !self.tables.contains(t)) {
            return Err(SyncError::Configuration(format!(
                "Required table {} is not in the synced table set",
                table
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SyncError::Configuration("fetch_timeout must be greater than zero".to_string()));
        }
        if self.background_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(SyncError::Configuration(
                "background_interval must be greater than zero when set".to_string(),
            ));
        }
        if self.schema_sample_size == 0 {
            return Err(SyncError::Configuration("schema_sample_size must be at least 1".to_string()));
        }
        if self.storage.db_path.trim().is_empty() {
            return Err(SyncError::Configuration("storage.db_path must not be empty".to_string()));
        }
        if !(self.remote.base_url.starts_with("http://") || self.remote.base_url.starts_with("https://")) {
            return Err(SyncError::Configuration(format!(
                "remote.base_url must be an http(s) URL, got {}",
                self.remote.base_url
            )));
        }
        Ok(())
    }
}
