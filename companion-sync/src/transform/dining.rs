use super::{fields, has_active_flag, EntityTransformer, RawRecord, Transformed};
use crate::schema::{ExpectedShape, FieldKind};
use crate::table::TableName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiningOption {
    pub id: String,
    pub name: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub address: String,
    pub meal_type: String,
    pub dress_code: String,
    pub is_seated: bool,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiningOptionTransformer;

impl EntityTransformer for DiningOptionTransformer {
    type Record = DiningOption;

    fn table(&self) -> TableName {
        TableName::DiningOptions
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("name", FieldKind::String)
            .required("is_active", FieldKind::Bool)
            .optional("date", FieldKind::String)
            .optional("time", FieldKind::String)
            .optional("location", FieldKind::String)
            .optional("is_seated", FieldKind::Bool)
            .optional("capacity", FieldKind::Number)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<DiningOption> {
        let Some(id) = fields::identifier(raw, &["id", "dining_option_id", "dining_id"]) else {
            return Transformed::Dropped("missing dining option id".to_string());
        };
        if !has_active_flag(raw) {
            return Transformed::Inactive;
        }

        Transformed::Kept(DiningOption {
            id,
            name: fields::text_or(raw, &["name", "title"], "Dining"),
            description: fields::text_or(raw, &["description", "details"], ""),
            date: fields::date_string(raw, &["date", "event_date", "start_time"]),
            time: fields::time_string(raw, &["time", "start_time"]),
            location: fields::named_text(raw, &["location", "venue", "restaurant"]).unwrap_or_default(),
            address: fields::text_or(raw, &["address", "location_address"], ""),
            meal_type: fields::text_or(raw, &["meal_type", "type", "category"], "meal").to_lowercase(),
            dress_code: fields::text_or(raw, &["dress_code", "attire"], ""),
            is_seated: fields::flag(raw, &["is_seated", "has_seating", "seated"]).unwrap_or(false),
            capacity: fields::count(raw, &["capacity", "max_capacity"]),
        })
    }

    fn sort(&self, records: &mut [DiningOption]) {
        records.sort_by_cached_key(|d| {
            (
                d.date.is_empty(),
                d.date.clone(),
                d.time.clone(),
                d.name.to_lowercase(),
                d.id.clone(),
            )
        });
    }
}
