//! Rule checking and type coercion for records.
//!
//! The spreadsheet backend stores everything as cell text, so records read from
//! it need coercion before they can be loaded into a typed store. `transform`
//! never fails: a value that cannot be coerced is kept as-is and logged, and
//! `validate` is then the place where it gets reported.

use crate::record::{is_blank, value_as_text, Record};
use crate::schema::{EntityRules, FieldType, RuleSet};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

const TRUE_TOKENS: [&str; 5] = ["true", "1", "o", "y", "yes"];
const FALSE_TOKENS: [&str; 5] = ["false", "0", "x", "n", "no"];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y"];

/// Result of validating one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// One rejected record in a batch, with its 1-based row number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidRecord {
    pub row: usize,
    pub data: Record,
    pub errors: Vec<String>,
}

/// Aggregate result of [`Validator::validate_batch`].
///
/// `valid_count + invalid_count` always equals the number of input records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchValidation {
    pub valid: bool,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub errors: Vec<InvalidRecord>,
}

/// Validates and coerces records against a [`RuleSet`].
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: RuleSet,
}

impl Validator {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Checks required fields and declared types. Entities with no rules are
    /// always valid.
    pub fn validate(&self, entity: &str, record: &Record) -> ValidationOutcome {
        let Some(rules) = self.rules.get(entity) else {
            return ValidationOutcome::from_errors(Vec::new());
        };
        ValidationOutcome::from_errors(check_rules(rules, record))
    }

    /// Coerces every declared field to its declared type.
    ///
    /// Blank values become `null` whatever the declared type. Undeclared fields
    /// pass through untouched.
    pub fn transform(&self, entity: &str, mut record: Record) -> Record {
        let Some(rules) = self.rules.get(entity) else {
            return record;
        };
        for (field, field_type) in &rules.field_types {
            let Some(value) = record.get_mut(field) else {
                continue;
            };
            if is_blank(value) {
                *value = Value::Null;
                continue;
            }
            if let Some(coerced) = coerce(value, *field_type) {
                *value = coerced;
            } else {
                warn!(
                    entity,
                    field = field.as_str(),
                    value = %value,
                    expected = %field_type,
                    "coercion failed, keeping original value"
                );
            }
        }
        record
    }

    /// Validates a slice of records, collecting failures with their row number.
    pub fn validate_batch(&self, entity: &str, records: &[Record]) -> BatchValidation {
        let mut result = BatchValidation::default();
        for (idx, record) in records.iter().enumerate() {
            let outcome = self.validate(entity, record);
            if outcome.valid {
                result.valid_count += 1;
            } else {
                result.invalid_count += 1;
                result.errors.push(InvalidRecord {
                    row: idx + 1,
                    data: record.clone(),
                    errors: outcome.errors,
                });
            }
        }
        result.valid = result.invalid_count == 0;
        result
    }
}

fn check_rules(rules: &EntityRules, record: &Record) -> Vec<String> {
    let mut errors = Vec::new();
    for field in &rules.required_fields {
        match record.get(field) {
            Some(v) if !is_blank(v) => {}
            _ => errors.push(format!("missing required field: {field}")),
        }
    }
    for (field, field_type) in &rules.field_types {
        let Some(value) = record.get(field) else {
            continue;
        };
        if is_blank(value) {
            continue;
        }
        if !type_matches(value, *field_type) {
            errors.push(format!(
                "field {field} expected {field_type}, got {}",
                json_kind(value)
            ));
        }
    }
    errors
}

fn type_matches(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Date => to_date(value).is_some(),
        FieldType::Array => value.is_array(),
        FieldType::Object => value.is_object(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce(value: &Value, field_type: FieldType) -> Option<Value> {
    match field_type {
        FieldType::Number => to_number(value),
        FieldType::Boolean => to_boolean(value).map(Value::Bool),
        FieldType::Date => to_date(value).map(Value::String),
        FieldType::Array => match value {
            Value::Array(_) => Some(value.clone()),
            Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_array),
            _ => None,
        },
        FieldType::Object => match value {
            Value::Object(_) => Some(value.clone()),
            Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
            _ => None,
        },
        FieldType::String => Some(Value::String(value_as_text(value))),
    }
}

/// Parses boolean tokens: `true/1/o/y/yes` and `false/0/x/n/no`, trimmed and
/// case-insensitive. Anything else is `None`.
pub fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            if TRUE_TOKENS.contains(&token.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parses numeric strings (thousands separators allowed). Integers stay
/// integers.
pub fn to_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            if let Ok(i) = cleaned.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

/// Normalizes date-like strings. Dates become `YYYY-MM-DD`, timestamps become
/// RFC 3339 in UTC.
pub fn to_date(value: &Value) -> Option<String> {
    let Value::String(raw) = value else {
        return None;
    };
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}
