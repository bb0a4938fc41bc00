//! Shared fakes for unit tests

use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::remote::RemoteDataProvider;
use crate::table::TableName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Event sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SyncEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Clone)]
enum Response {
    Rows(Vec<Value>),
    Fail(String),
}

/// Provider answering from a fixed per-table script, with optional latency.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<HashMap<TableName, Response>>,
    delays: Mutex<HashMap<TableName, Duration>>,
    calls: Mutex<Vec<TableName>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(self, table: TableName, rows: Vec<Value>) -> Self {
        self.responses.lock().insert(table, Response::Rows(rows));
        self
    }

    pub fn fail(self, table: TableName, message: &str) -> Self {
        self.responses
            .lock()
            .insert(table, Response::Fail(message.to_string()));
        self
    }

    pub fn delay(self, table: TableName, delay: Duration) -> Self {
        self.delays.lock().insert(table, delay);
        self
    }

    pub fn calls(&self) -> Vec<TableName> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteDataProvider for ScriptedProvider {
    async fn fetch_table(
        &self,
        table: TableName,
        _since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Value>> {
        self.calls.lock().push(table);

        let delay = self.delays.lock().get(&table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().get(&table).cloned();
        match response {
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Fail(message)) => Err(SyncError::Network(message)),
            None => Ok(Vec::new()),
        }
    }
}
