//! Remote data provider
//!
//! The engine never talks HTTP directly; it consumes a per-table fetch
//! capability. [`HttpRemoteProvider`] is the stock implementation against the
//! conference REST API.

use crate::config::duration_millis;
use crate::error::{SyncError, SyncResult};
use crate::table::TableName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Per-table fetch capability.
#[async_trait]
pub trait RemoteDataProvider: Send + Sync {
    /// Fetch every row of `table`, or only rows changed after `since`.
    async fn fetch_table(
        &self,
        table: TableName,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Value>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL; tables are fetched from `{base_url}/{table}`
    pub base_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// HTTP-level timeout (in milliseconds, for serialization)
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpRemoteProvider {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteProvider {
    pub fn new(config: &RemoteConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn table_url(&self, table: TableName) -> String {
        format!("{}/{}", self.base_url, table)
    }
}

/// Accept either a bare array of rows or `{ "data": [...] }`.
fn rows_from_body(table: TableName, body: Value) -> SyncResult<Vec<Value>> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(Value::Null) | None => Err(SyncError::Network(format!(
                "{} response has no data array",
                table
            ))),
            Some(_) => Err(SyncError::Network(format!(
                "{} response data is not an array",
                table
            ))),
        },
        _ => Err(SyncError::Network(format!(
            "{} response is not a JSON array or object",
            table
        ))),
    }
}

#[async_trait]
impl RemoteDataProvider for HttpRemoteProvider {
    async fn fetch_table(
        &self,
        table: TableName,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Value>> {
        let url = self.table_url(table);
        let mut request = self.client.get(&url);

        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let body: Value = response.json().await?;
        let rows = rows_from_body(table, body)?;

        tracing::debug!(table = %table, rows = rows.len(), "Fetched table");

        Ok(rows)
    }
}
