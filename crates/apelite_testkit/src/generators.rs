//! Property-based test generators using proptest.

use apelite_core::{Row, Table};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for replicated tables.
pub fn table_strategy() -> impl Strategy<Value = Table> {
    prop::sample::select(Table::ALL.to_vec())
}

/// Strategy for row ids.
pub fn row_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for `updated_at` values: RFC 3339 UTC instants between 2020 and
/// 2029.
pub fn timestamp_strategy() -> impl Strategy<Value = String> {
    (2020u32..2030, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
        |(y, mo, d, h, mi, s)| format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z"),
    )
}

/// Strategy for business field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[ -~]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for the business fields of a row.
pub fn fields_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(
        prop::string::string_regex("f_[a-z]{1,8}").expect("Invalid regex"),
        field_value_strategy(),
        0..5,
    )
    .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for a row with the given id.
pub fn row_with_id(id: String) -> impl Strategy<Value = Row> {
    (
        fields_strategy(),
        prop::option::of(timestamp_strategy()),
        prop::option::of(timestamp_strategy()),
    )
        .prop_map(move |(mut fields, created_at, updated_at)| {
            fields.insert("id".into(), Value::String(id.clone()));
            if let Some(at) = created_at {
                fields.insert("created_at".into(), Value::String(at));
            }
            if let Some(at) = updated_at {
                fields.insert("updated_at".into(), Value::String(at));
            }
            Row::from_map(fields)
        })
}

/// Strategy for a single row.
pub fn row_strategy() -> impl Strategy<Value = Row> {
    row_id_strategy().prop_flat_map(row_with_id)
}

/// Strategy for up to `max` rows with distinct ids.
pub fn rows_strategy(max: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::btree_set(row_id_strategy(), 0..=max).prop_flat_map(|ids| {
        ids.into_iter()
            .map(row_with_id)
            .collect::<Vec<_>>()
    })
}
