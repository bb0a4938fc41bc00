use super::{fields, has_active_flag, EntityTransformer, RawRecord, Transformed};
use crate::schema::{ExpectedShape, FieldKind};
use crate::table::TableName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub company: String,
    pub job_title: String,
    pub bio: String,
    pub photo_url: String,
    pub attendee_type: String,
    pub is_speaker: bool,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttendeeTransformer;

/// First and last name, falling back to splitting a single full-name field
/// on its first whitespace.
fn names(raw: &RawRecord) -> (String, String) {
    let first = fields::text(raw, &["first_name", "firstName", "given_name"]);
    let last = fields::text(raw, &["last_name", "lastName", "family_name", "surname"]);
    if first.is_some() || last.is_some() {
        return (first.unwrap_or_default(), last.unwrap_or_default());
    }

    match fields::text(raw, &["name", "full_name"]) {
        Some(full) => match full.split_once(char::is_whitespace) {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (full, String::new()),
        },
        None => (String::new(), String::new()),
    }
}

impl EntityTransformer for AttendeeTransformer {
    type Record = Attendee;

    fn table(&self) -> TableName {
        TableName::Attendees
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("is_active", FieldKind::Bool)
            .optional("first_name", FieldKind::String)
            .optional("last_name", FieldKind::String)
            .optional("email", FieldKind::String)
            .optional("company", FieldKind::String)
            .optional("title", FieldKind::String)
            .optional("is_speaker", FieldKind::Bool)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<Attendee> {
        let Some(id) = fields::identifier(raw, &["id", "attendee_id", "uuid"]) else {
            return Transformed::Dropped("missing attendee id".to_string());
        };
        if !has_active_flag(raw) {
            return Transformed::Inactive;
        }

        let (first_name, last_name) = names(raw);
        let email = fields::text_or(raw, &["email", "email_address"], "").to_lowercase();

        let composed = format!("{} {}", first_name, last_name).trim().to_string();
        let display_name = fields::text(raw, &["display_name", "preferred_name"])
            .or_else(|| (!composed.is_empty()).then_some(composed))
            .or_else(|| (!email.is_empty()).then(|| email.clone()))
            .unwrap_or_else(|| "Attendee".to_string());

        Transformed::Kept(Attendee {
            id,
            first_name,
            last_name,
            display_name,
            email,
            company: fields::named_text(raw, &["company", "company_name", "organization"])
                .unwrap_or_default(),
            job_title: fields::text_or(raw, &["title", "job_title", "position"], ""),
            bio: fields::text_or(raw, &["bio", "biography", "about"], ""),
            photo_url: fields::text_or(raw, &["photo_url", "avatar_url", "image_url"], ""),
            attendee_type: fields::text_or(raw, &["attendee_type", "registration_type", "type"], "attendee")
                .to_lowercase(),
            is_speaker: fields::flag(raw, &["is_speaker", "speaker"]).unwrap_or(false),
            interests: fields::text_list(raw, &["interests", "tags"]),
        })
    }

    fn sort(&self, records: &mut [Attendee]) {
        records.sort_by_cached_key(|a| {
            (a.last_name.to_lowercase(), a.first_name.to_lowercase(), a.id.clone())
        });
    }
}
