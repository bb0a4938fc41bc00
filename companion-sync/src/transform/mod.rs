//! Raw row to cached record transformers
//!
//! Every table has one transformer. A transformer is a pure function from a
//! raw server row to the stable record shape the app reads, and it is the
//! single place the active-status filter runs: inactive rows never reach the
//! cache store.
//!
//! Entity transformers are written against a typed record
//! ([`EntityTransformer`]); the orchestrator drives them through the
//! object-safe [`TableTransformer`] interface looked up by table name in a
//! [`TransformerRegistry`].

pub mod fields;

mod agenda;
mod attendee;
mod dining;
mod hotel;
mod seating;
mod sponsor;

pub use agenda::{AgendaItem, AgendaItemTransformer};
pub use attendee::{Attendee, AttendeeTransformer};
pub use dining::{DiningOption, DiningOptionTransformer};
pub use hotel::{Hotel, HotelTransformer};
pub use seating::{
    SeatAssignment, SeatAssignmentTransformer, SeatingConfiguration, SeatingConfigurationTransformer,
};
pub use sponsor::{Sponsor, SponsorTransformer};

use crate::error::{SyncError, SyncResult};
use crate::schema::ExpectedShape;
use crate::table::TableName;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A row as fetched from the server, before any mapping.
pub type RawRecord = serde_json::Map<String, Value>;

/// Explicit active flag aliases shared by most tables.
pub(crate) const ACTIVE_FLAG_KEYS: [&str; 3] = ["is_active", "active", "isActive"];

/// Explicit active flag; absent or unreadable means inactive.
pub(crate) fn has_active_flag(raw: &RawRecord) -> bool {
    fields::flag(raw, &ACTIVE_FLAG_KEYS).unwrap_or(false)
}

/// Outcome of transforming a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed<T> {
    Kept(T),
    /// Well-formed but filtered by the active-status predicate.
    Inactive,
    /// Unrecoverably malformed; the reason is logged by the caller.
    Dropped(String),
}

impl<T> Transformed<T> {
    pub fn kept(self) -> Option<T> {
        match self {
            Transformed::Kept(record) => Some(record),
            _ => None,
        }
    }
}

/// Typed transformer for one entity.
pub trait EntityTransformer: Send + Sync {
    type Record: Serialize + DeserializeOwned + Clone + Send;

    fn table(&self) -> TableName;

    fn expected_shape(&self) -> ExpectedShape;

    fn transform(&self, raw: &RawRecord) -> Transformed<Self::Record>;

    /// Ordering applied once per batch so readers never re-sort.
    fn sort(&self, _records: &mut [Self::Record]) {}
}

/// Result of transforming a whole fetched table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformBatch {
    pub records: Vec<Value>,
    pub inactive: usize,
    pub dropped: Vec<String>,
}

impl TransformBatch {
    pub fn received(&self) -> usize {
        self.records.len() + self.inactive + self.dropped.len()
    }

    /// True when rows arrived but not one of them could be transformed.
    pub fn all_dropped(&self) -> bool {
        !self.dropped.is_empty() && self.records.is_empty() && self.inactive == 0
    }
}

/// Object-safe transformer interface used for per-table dispatch.
pub trait TableTransformer: Send + Sync {
    fn table(&self) -> TableName;

    fn expected_shape(&self) -> ExpectedShape;

    fn transform_batch(&self, rows: &[Value]) -> SyncResult<TransformBatch>;
}

impl<T: EntityTransformer> TableTransformer for T {
    fn table(&self) -> TableName {
        EntityTransformer::table(self)
    }

    fn expected_shape(&self) -> ExpectedShape {
        EntityTransformer::expected_shape(self)
    }

    fn transform_batch(&self, rows: &[Value]) -> SyncResult<TransformBatch> {
        let mut kept = Vec::with_capacity(rows.len());
        let mut batch = TransformBatch::default();

        for (index, row) in rows.iter().enumerate() {
            let Some(raw) = row.as_object() else {
                batch.dropped.push(format!("row {}: not a JSON object", index));
                continue;
            };
            match self.transform(raw) {
                Transformed::Kept(record) => kept.push(record),
                Transformed::Inactive => batch.inactive += 1,
                Transformed::Dropped(reason) => batch.dropped.push(format!("row {}: {}", index, reason)),
            }
        }

        self.sort(&mut kept);
        batch.records = kept
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?;

        Ok(batch)
    }
}

/// Table name to transformer lookup.
#[derive(Clone)]
pub struct TransformerRegistry {
    transformers: HashMap<TableName, Arc<dyn TableTransformer>>,
}

impl TransformerRegistry {
    pub fn empty() -> Self {
        Self { transformers: HashMap::new() }
    }

    /// Register a transformer, replacing any previous one for its table.
    pub fn register(&mut self, transformer: impl TableTransformer + 'static) -> &mut Self {
        let table = TableTransformer::table(&transformer);
        self.transformers.insert(table, Arc::new(transformer));
        self
    }

    pub fn get(&self, table: TableName) -> SyncResult<Arc<dyn TableTransformer>> {
        self.transformers
            .get(&table)
            .cloned()
            .ok_or_else(|| SyncError::Configuration(format!("No transformer registered for {}", table)))
    }

    pub fn tables(&self) -> Vec<TableName> {
        TableName::canonical_order(&self.transformers.keys().copied().collect::<Vec<_>>())
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(AttendeeTransformer)
            .register(AgendaItemTransformer)
            .register(SponsorTransformer)
            .register(HotelTransformer)
            .register(DiningOptionTransformer)
            .register(SeatingConfigurationTransformer)
            .register(SeatAssignmentTransformer);
        registry
    }
}
