use serde_json::{Map, Value};

/// A single row/document. Field order is preserved so spreadsheet columns
/// round-trip in header order.
pub type Record = Map<String, Value>;

/// Equality filter applied to records. Every key must match.
pub type Filter = Map<String, Value>;

/// Name of the primary identifier field shared by both backends.
pub const ID_FIELD: &str = "id";

/// Returns true for `null` and for strings that are empty after trimming.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Renders a value the way a spreadsheet cell would show it.
///
/// Strings are returned without quotes; arrays and objects become JSON text.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Loose equality: identical JSON, or identical cell text (`7` matches `"7"`).
pub fn values_match(left: &Value, right: &Value) -> bool {
    left == right || value_as_text(left) == value_as_text(right)
}

/// Extracts the record's `id` field as text, if present and non-blank.
pub fn record_id(record: &Record) -> Option<String> {
    record
        .get(ID_FIELD)
        .filter(|v| !is_blank(v))
        .map(value_as_text)
}

/// Returns true when every filter entry matches the record.
pub fn matches_filter(record: &Record, filter: &Filter) -> bool {
    filter.iter().all(|(field, expected)| {
        record
            .get(field)
            .is_some_and(|actual| values_match(actual, expected))
    })
}
