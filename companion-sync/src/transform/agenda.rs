use super::{fields, has_active_flag, EntityTransformer, RawRecord, Transformed};
use crate::schema::{ExpectedShape, FieldKind};
use crate::table::TableName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// `YYYY-MM-DD`, empty when unscheduled.
    pub date: String,
    /// `HH:MM`, empty when unscheduled.
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub speaker: String,
    pub item_type: String,
    pub capacity: u32,
    pub tags: Vec<String>,
    pub requires_registration: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgendaItemTransformer;

impl EntityTransformer for AgendaItemTransformer {
    type Record = AgendaItem;

    fn table(&self) -> TableName {
        TableName::AgendaItems
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("title", FieldKind::String)
            .required("is_active", FieldKind::Bool)
            .optional("description", FieldKind::String)
            .optional("date", FieldKind::String)
            .optional("start_time", FieldKind::String)
            .optional("end_time", FieldKind::String)
            .optional("location", FieldKind::String)
            .optional("speaker", FieldKind::String)
            .optional("type", FieldKind::String)
            .optional("capacity", FieldKind::Number)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<AgendaItem> {
        let Some(id) = fields::identifier(raw, &["id", "agenda_item_id", "session_id"]) else {
            return Transformed::Dropped("missing agenda item id".to_string());
        };
        if !has_active_flag(raw) {
            return Transformed::Inactive;
        }

        Transformed::Kept(AgendaItem {
            id,
            title: fields::text_or(raw, &["title", "name", "session_title"], "Untitled session"),
            description: fields::text_or(raw, &["description", "abstract", "summary"], ""),
            // A combined datetime in start_time carries the date for older rows.
            date: fields::date_string(raw, &["date", "session_date", "day", "start_time", "starts_at"]),
            start_time: fields::time_string(raw, &["start_time", "starts_at", "time"]),
            end_time: fields::time_string(raw, &["end_time", "ends_at"]),
            location: fields::named_text(raw, &["location", "room", "venue"]).unwrap_or_default(),
            // speaker has been a string, an object and a list across versions.
            speaker: fields::named_text(raw, &["speaker", "speakers", "speaker_name", "presenter"])
                .unwrap_or_default(),
            item_type: fields::text_or(raw, &["type", "session_type", "item_type", "category"], "session")
                .to_lowercase(),
            capacity: fields::count(raw, &["capacity", "max_attendees"]),
            tags: fields::text_list(raw, &["tags", "topics"]),
            requires_registration: fields::flag(raw, &["requires_registration", "registration_required"])
                .unwrap_or(false),
        })
    }

    fn sort(&self, records: &mut [AgendaItem]) {
        // Unscheduled items go last.
        records.sort_by_cached_key(|item| {
            (
                item.date.is_empty(),
                item.date.clone(),
                item.start_time.is_empty(),
                item.start_time.clone(),
                item.title.to_lowercase(),
                item.id.clone(),
            )
        });
    }
}
