//! Conversion between sheet rows and records.

use super::client::SheetData;
use serde_json::Value;
use switchyard_model::{value_as_text, Record};

/// Turns one data row into a record keyed by the header.
///
/// Missing trailing cells become empty strings. Cells holding JSON arrays or
/// objects are decoded.
pub fn row_to_record(header: &[String], row: &[Value]) -> Record {
    let mut record = Record::new();
    for (idx, field) in header.iter().enumerate() {
        if field.is_empty() {
            continue;
        }
        let cell = row.get(idx).cloned().unwrap_or(Value::String(String::new()));
        record.insert(field.clone(), decode_cell(cell));
    }
    record
}

/// Lays a record out in header order. Fields outside the header are dropped.
pub fn record_to_row(header: &[String], record: &Record) -> Vec<Value> {
    header
        .iter()
        .map(|field| record.get(field).map_or(Value::String(String::new()), encode_cell))
        .collect()
}

/// All records of a sheet, in row order.
pub fn sheet_records(data: &SheetData) -> Vec<Record> {
    data.rows
        .iter()
        .map(|row| row_to_record(&data.header, row))
        .collect()
}

fn decode_cell(cell: Value) -> Value {
    if let Value::String(s) = &cell {
        let trimmed = s.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                if parsed.is_array() || parsed.is_object() {
                    return parsed;
                }
            }
        }
    }
    cell
}

fn encode_cell(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(_) | Value::Object(_) => Value::String(value_as_text(value)),
        other => other.clone(),
    }
}
