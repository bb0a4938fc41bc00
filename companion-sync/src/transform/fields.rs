//! Per-field compatibility rules
//!
//! Each rule takes a list of candidate keys (current name first, legacy
//! names after) and coerces whatever it finds into one typed value. The
//! first key that yields a usable value wins, so an empty string under the
//! current name falls through to a legacy alias.

use super::RawRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;

/// Keys tried, in order, when an object stands where text is expected.
const NAME_KEYS: [&str; 4] = ["name", "full_name", "display_name", "title"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

const TIME_FORMATS: [&str; 4] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M", "%I:%M %p"];

/// First non-null value under any of `keys`.
pub fn pick<'a>(raw: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

/// Scalar text: trimmed non-empty strings, numbers rendered as text.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text that may arrive as a plain string, an object carrying a name, or a
/// list of either (joined with ", ").
pub fn value_named_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => NAME_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(value_text),
        Value::Array(items) => {
            let names: Vec<String> = items.iter().filter_map(value_named_text).collect();
            (!names.is_empty()).then(|| names.join(", "))
        }
        other => value_text(other),
    }
}

pub fn text(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(value_text)
}

pub fn text_or(raw: &RawRecord, keys: &[&str], default: &str) -> String {
    text(raw, keys).unwrap_or_else(|| default.to_string())
}

pub fn named_text(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(value_named_text)
}

/// Record identifiers: strings as-is, integral numbers rendered as text.
pub fn identifier(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(|value| match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            Value::String(_) => value_text(value),
            _ => None,
        })
}

pub fn coerce_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn flag(raw: &RawRecord, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(coerce_flag)
}

/// Whether a status-like field names one of `members`.
///
/// `None` when no candidate key carries text, so callers can fall back to
/// an explicit flag.
pub fn category_member(raw: &RawRecord, keys: &[&str], members: &[&str]) -> Option<bool> {
    text(raw, keys).map(|category| {
        let category = category.to_ascii_lowercase();
        members.iter().any(|member| *member == category)
    })
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

pub fn integer(raw: &RawRecord, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(coerce_integer)
}

/// Non-negative count; negatives clamp to zero.
pub fn count(raw: &RawRecord, keys: &[&str]) -> u32 {
    integer(raw, keys)
        .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

pub fn number(raw: &RawRecord, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|f| f.is_finite())
}

/// A list that may arrive as an array or a comma-separated string.
pub fn text_list(raw: &RawRecord, keys: &[&str]) -> Vec<String> {
    match pick(raw, keys) {
        Some(Value::Array(items)) => items.iter().filter_map(value_named_text).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Timestamps as RFC 3339, naive `YYYY-MM-DD HH:MM:SS`, or epoch millis.
pub fn datetime(raw: &RawRecord, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(|value| match value {
            Value::String(s) => parse_datetime(s.trim()),
            Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            _ => None,
        })
}

/// Calendar date from a plain date or the date part of a datetime.
pub fn date(raw: &RawRecord, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find_map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
        })
}

/// Time of day from a plain time or the time part of a datetime.
pub fn time_of_day(raw: &RawRecord, keys: &[&str]) -> Option<NaiveTime> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find_map(|s| {
            TIME_FORMATS
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
                .or_else(|| parse_datetime(s).map(|dt| dt.time()))
        })
}

/// `YYYY-MM-DD`, or empty when absent.
pub fn date_string(raw: &RawRecord, keys: &[&str]) -> String {
    date(raw, keys)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// `HH:MM`, or empty when absent.
pub fn time_string(raw: &RawRecord, keys: &[&str]) -> String {
    time_of_day(raw, keys)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}
