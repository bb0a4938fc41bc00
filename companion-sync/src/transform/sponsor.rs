use super::{fields, has_active_flag, EntityTransformer, RawRecord, Transformed};
use crate::schema::{ExpectedShape, FieldKind};
use crate::table::TableName;
use serde::{Deserialize, Serialize};

/// A sponsoring company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsor {
    pub id: String,
    pub name: String,
    pub tier: String,
    pub description: String,
    pub logo_url: String,
    pub website_url: String,
    pub booth: String,
    pub display_order: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SponsorTransformer;

impl EntityTransformer for SponsorTransformer {
    type Record = Sponsor;

    fn table(&self) -> TableName {
        TableName::Sponsors
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("name", FieldKind::String)
            .required("is_active", FieldKind::Bool)
            .optional("tier", FieldKind::String)
            .optional("description", FieldKind::String)
            .optional("logo_url", FieldKind::String)
            .optional("website_url", FieldKind::String)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<Sponsor> {
        let Some(id) = fields::identifier(raw, &["id", "company_id", "sponsor_id"]) else {
            return Transformed::Dropped("missing sponsor id".to_string());
        };
        if !has_active_flag(raw) {
            return Transformed::Inactive;
        }

        Transformed::Kept(Sponsor {
            id,
            name: fields::text_or(raw, &["name", "company_name", "display_name"], "Unnamed sponsor"),
            tier: fields::text_or(raw, &["tier", "sponsorship_level", "level"], "partner").to_lowercase(),
            description: fields::text_or(raw, &["description", "about"], ""),
            logo_url: fields::text_or(raw, &["logo_url", "logo", "image_url"], ""),
            website_url: fields::text_or(raw, &["website_url", "website", "url"], ""),
            booth: fields::text_or(raw, &["booth", "booth_number"], ""),
            display_order: fields::integer(raw, &["display_order", "sort_order", "position"]).unwrap_or(0),
        })
    }

    fn sort(&self, records: &mut [Sponsor]) {
        records.sort_by_cached_key(|s| (s.name.to_lowercase(), s.id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_company_schema_aliases() {
        let raw = json!({
            "company_id": "c-9",
            "company_name": "Acme",
            "sponsorship_level": "Gold",
            "website": "https://acme.test",
            "booth_number": 12,
            "is_active": "true"
        });
        let sponsor = SponsorTransformer
            .transform(raw.as_object().unwrap())
            .kept()
            .unwrap();

        assert_eq!(sponsor.id, "c-9");
        assert_eq!(sponsor.name, "Acme");
        assert_eq!(sponsor.tier, "gold");
        assert_eq!(sponsor.website_url, "https://acme.test");
        assert_eq!(sponsor.booth, "12");
        assert_eq!(sponsor.display_order, 0);
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let raw = json!({"id": 5, "is_active": true});
        let sponsor = SponsorTransformer
            .transform(raw.as_object().unwrap())
            .kept()
            .unwrap();
        assert_eq!(sponsor.name, "Unnamed sponsor");
        assert_eq!(sponsor.tier, "partner");
        assert_eq!(sponsor.logo_url, "");
    }
}
