//! Property tests for the transformer stage

use companion_sync::transform::{fields, TableTransformer, TransformerRegistry};
use companion_sync::TableName;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 :-]{0,16}".prop_map(Value::String),
        prop_oneof![Just("true"), Just("no"), Just("1"), Just("active"), Just("assigned")]
            .prop_map(|s| Value::String(s.to_string())),
    ]
}

fn field_value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..3)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

const KEYS: [&str; 16] = [
    "id", "name", "title", "first_name", "last_name", "speaker", "is_active", "active",
    "status", "date", "start_time", "capacity", "tier", "attendee_id", "configuration_id",
    "seat_number",
];

fn raw_row() -> impl Strategy<Value = Value> {
    prop::collection::vec((prop::sample::select(KEYS.to_vec()), field_value()), 0..10).prop_map(
        |pairs| {
            let mut row = Map::new();
            for (key, value) in pairs {
                row.insert(key.to_string(), value);
            }
            Value::Object(row)
        },
    )
}

fn active_flag() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        any::<bool>().prop_map(|b| Some(Value::Bool(b))),
        (0i64..3).prop_map(|n| Some(json!(n))),
        prop::sample::select(vec!["true", "false", "yes", "no", "y", "n", "t", "f", "maybe", ""])
            .prop_map(|s| Some(Value::String(s.to_string()))),
    ]
}

proptest! {
    #[test]
    fn transforming_twice_gives_identical_output(rows in prop::collection::vec(raw_row(), 0..8)) {
        let registry = TransformerRegistry::default();
        for table in TableName::ALL {
            let transformer = registry.get(table).unwrap();
            let first = transformer.transform_batch(&rows).unwrap();
            let second = transformer.transform_batch(&rows).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn only_explicitly_active_rows_survive(flags in prop::collection::vec(active_flag(), 0..12)) {
        let rows: Vec<Value> = flags
            .iter()
            .enumerate()
            .map(|(i, flag)| {
                let mut row = json!({"id": format!("s{}", i), "name": "Sponsor"});
                if let Some(flag) = flag {
                    row["is_active"] = flag.clone();
                }
                row
            })
            .collect();

        let expected: Vec<String> = flags
            .iter()
            .enumerate()
            .filter_map(|(i, flag)| {
                let active = flag.as_ref().and_then(fields::coerce_flag).unwrap_or(false);
                active.then(|| format!("s{}", i))
            })
            .collect();

        let batch = TransformerRegistry::default()
            .get(TableName::Sponsors)
            .unwrap()
            .transform_batch(&rows)
            .unwrap();

        let mut kept: Vec<String> = batch
            .records
            .iter()
            .map(|record| record["id"].as_str().unwrap().to_string())
            .collect();
        kept.sort();
        let mut expected = expected;
        expected.sort();

        prop_assert_eq!(kept, expected);
        prop_assert_eq!(batch.inactive, flags.len() - batch.records.len());
        prop_assert!(batch.dropped.is_empty());
    }
}
