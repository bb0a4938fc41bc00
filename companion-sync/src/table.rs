//! Synced table names and their canonical order

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Server-side tables replicated into the local cache.
///
/// Variant order is the canonical sync order: reference tables come before
/// the tables that join against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Attendees,
    AgendaItems,
    Sponsors,
    Hotels,
    DiningOptions,
    SeatingConfigurations,
    SeatAssignments,
}

impl TableName {
    /// Every table, in canonical sync order.
    pub const ALL: [TableName; 7] = [
        TableName::Attendees,
        TableName::AgendaItems,
        TableName::Sponsors,
        TableName::Hotels,
        TableName::DiningOptions,
        TableName::SeatingConfigurations,
        TableName::SeatAssignments,
    ];

    /// Tables that must sync for a run to count as successful.
    pub const REQUIRED: [TableName; 2] = [TableName::Attendees, TableName::AgendaItems];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Attendees => "attendees",
            TableName::AgendaItems => "agenda_items",
            TableName::Sponsors => "sponsors",
            TableName::Hotels => "hotels",
            TableName::DiningOptions => "dining_options",
            TableName::SeatingConfigurations => "seating_configurations",
            TableName::SeatAssignments => "seat_assignments",
        }
    }

    /// Cache store key holding this table's envelope.
    pub fn cache_key(&self) -> String {
        format!("cache:{}", self.as_str())
    }

    /// Deduplicate and sort a requested table set into canonical order.
    pub fn canonical_order(tables: &[TableName]) -> Vec<TableName> {
        let mut ordered = tables.to_vec();
        ordered.sort();
        ordered.dedup();
        ordered
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TableName::ALL
            .into_iter()
            .find(|table| table.as_str() == normalized)
            .ok_or_else(|| SyncError::InvalidOperation(format!("Unknown table: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_sorts_and_dedups() {
        let requested = [
            TableName::SeatAssignments,
            TableName::Attendees,
            TableName::DiningOptions,
            TableName::Attendees,
            TableName::SeatingConfigurations,
        ];

        assert_eq!(
            TableName::canonical_order(&requested),
            vec![
                TableName::Attendees,
                TableName::DiningOptions,
                TableName::SeatingConfigurations,
                TableName::SeatAssignments,
            ]
        );
    }

    #[test]
    fn test_parse_round_trips_every_table() {
        for table in TableName::ALL {
            assert_eq!(table.as_str().parse::<TableName>().unwrap(), table);
        }
        assert_eq!("Agenda-Items".parse::<TableName>().unwrap(), TableName::AgendaItems);
        assert!("speakers".parse::<TableName>().is_err());
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(TableName::Sponsors.cache_key(), "cache:sponsors");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&TableName::DiningOptions).unwrap();
        assert_eq!(json, "\"dining_options\"");
    }
}
