//! Seating configurations and seat assignments
//!
//! Neither table carries a reliable boolean flag; whether a row is live is
//! derived from its status category, with the explicit flag only as a
//! fallback for rows that have no status at all.

use super::{fields, EntityTransformer, RawRecord, Transformed, ACTIVE_FLAG_KEYS};
use crate::schema::{ExpectedShape, FieldKind};
use crate::table::TableName;
use serde::{Deserialize, Serialize};

const LIVE_CONFIGURATION_STATUSES: [&str; 2] = ["active", "published"];
const LIVE_ASSIGNMENT_STATUSES: [&str; 2] = ["assigned", "confirmed"];

fn is_live(raw: &RawRecord, status_keys: &[&str], members: &[&str]) -> bool {
    fields::category_member(raw, status_keys, members)
        .or_else(|| fields::flag(raw, &ACTIVE_FLAG_KEYS))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatingConfiguration {
    pub id: String,
    pub name: String,
    pub dining_option_id: String,
    pub layout_type: String,
    pub table_count: u32,
    pub seats_per_table: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeatingConfigurationTransformer;

impl EntityTransformer for SeatingConfigurationTransformer {
    type Record = SeatingConfiguration;

    fn table(&self) -> TableName {
        TableName::SeatingConfigurations
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("configuration_status", FieldKind::String)
            .optional("name", FieldKind::String)
            .optional("dining_option_id", FieldKind::String)
            .optional("layout_type", FieldKind::String)
            .optional("table_count", FieldKind::Number)
            .optional("seats_per_table", FieldKind::Number)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<SeatingConfiguration> {
        let Some(id) = fields::identifier(raw, &["id", "configuration_id"]) else {
            return Transformed::Dropped("missing seating configuration id".to_string());
        };
        if !is_live(raw, &["configuration_status", "status"], &LIVE_CONFIGURATION_STATUSES) {
            return Transformed::Inactive;
        }

        Transformed::Kept(SeatingConfiguration {
            id,
            name: fields::text_or(raw, &["name", "title"], "Seating"),
            dining_option_id: fields::identifier(raw, &["dining_option_id", "dining_id", "event_id"])
                .unwrap_or_default(),
            layout_type: fields::text_or(raw, &["layout_type", "layout"], "round").to_lowercase(),
            table_count: fields::count(raw, &["table_count", "number_of_tables", "tables"]),
            seats_per_table: fields::count(raw, &["seats_per_table", "table_capacity"]),
        })
    }

    fn sort(&self, records: &mut [SeatingConfiguration]) {
        records.sort_by_cached_key(|c| (c.name.to_lowercase(), c.id.clone()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub id: String,
    pub attendee_id: String,
    pub configuration_id: String,
    pub table_name: String,
    pub seat_number: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeatAssignmentTransformer;

impl EntityTransformer for SeatAssignmentTransformer {
    type Record = SeatAssignment;

    fn table(&self) -> TableName {
        TableName::SeatAssignments
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("attendee_id", FieldKind::String)
            .required("assignment_status", FieldKind::String)
            .optional("configuration_id", FieldKind::String)
            .optional("table_name", FieldKind::String)
            .optional("seat_number", FieldKind::Number)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<SeatAssignment> {
        let Some(id) = fields::identifier(raw, &["id", "assignment_id"]) else {
            return Transformed::Dropped("missing seat assignment id".to_string());
        };
        let Some(attendee_id) = fields::identifier(raw, &["attendee_id", "user_id", "attendee"]) else {
            return Transformed::Dropped(format!("seat assignment {} has no attendee", id));
        };
        if !is_live(raw, &["assignment_status", "status"], &LIVE_ASSIGNMENT_STATUSES) {
            return Transformed::Inactive;
        }

        Transformed::Kept(SeatAssignment {
            id,
            attendee_id,
            configuration_id: fields::identifier(
                raw,
                &["configuration_id", "seating_configuration_id", "config_id"],
            )
            .unwrap_or_default(),
            table_name: fields::text_or(raw, &["table_name", "table_number", "table"], ""),
            seat_number: fields::count(raw, &["seat_number", "seat"]),
        })
    }

    fn sort(&self, records: &mut [SeatAssignment]) {
        // Numeric table names order numerically ("2" before "10").
        records.sort_by_cached_key(|a| {
            (
                a.configuration_id.clone(),
                a.table_name.parse::<u64>().ok(),
                a.table_name.clone(),
                a.seat_number,
                a.id.clone(),
            )
        });
    }
}
