use super::{fields, has_active_flag, EntityTransformer, RawRecord, Transformed};
use crate::schema::{ExpectedShape, FieldKind};
use crate::table::TableName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub website_url: String,
    pub booking_url: String,
    pub description: String,
    pub image_url: String,
    pub distance_km: f64,
    pub group_rate_code: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HotelTransformer;

impl EntityTransformer for HotelTransformer {
    type Record = Hotel;

    fn table(&self) -> TableName {
        TableName::Hotels
    }

    fn expected_shape(&self) -> ExpectedShape {
        ExpectedShape::new()
            .required("id", FieldKind::String)
            .required("name", FieldKind::String)
            .required("is_active", FieldKind::Bool)
            .optional("address", FieldKind::String)
            .optional("phone", FieldKind::String)
            .optional("website_url", FieldKind::String)
            .optional("distance_km", FieldKind::Number)
    }

    fn transform(&self, raw: &RawRecord) -> Transformed<Hotel> {
        let Some(id) = fields::identifier(raw, &["id", "hotel_id"]) else {
            return Transformed::Dropped("missing hotel id".to_string());
        };
        if !has_active_flag(raw) {
            return Transformed::Inactive;
        }

        Transformed::Kept(Hotel {
            id,
            name: fields::text_or(raw, &["name", "hotel_name"], "Unnamed hotel"),
            address: fields::text_or(raw, &["address", "street_address", "location"], ""),
            phone: fields::text_or(raw, &["phone", "phone_number"], ""),
            website_url: fields::text_or(raw, &["website_url", "website", "url"], ""),
            booking_url: fields::text_or(raw, &["booking_url", "booking_link", "reservation_url"], ""),
            description: fields::text_or(raw, &["description", "notes"], ""),
            image_url: fields::text_or(raw, &["image_url", "photo_url"], ""),
            // Older rows carried miles.
            distance_km: fields::number(raw, &["distance_km"])
                .or_else(|| fields::number(raw, &["distance_miles"]).map(|miles| miles * 1.609_344))
                .unwrap_or(0.0),
            group_rate_code: fields::text_or(raw, &["group_rate_code", "discount_code", "promo_code"], ""),
        })
    }

    fn sort(&self, records: &mut [Hotel]) {
        records.sort_by_cached_key(|h| (h.name.to_lowercase(), h.id.clone()));
    }
}
