use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Constraints for one entity: which fields must be present and what type
/// each declared field holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRules {
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub field_types: BTreeMap<String, FieldType>,
}

impl EntityRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a field as required.
    pub fn require(mut self, field: &str) -> Self {
        if !self.required_fields.iter().any(|f| f == field) {
            self.required_fields.push(field.to_string());
        }
        self
    }

    /// Declares a field's type.
    pub fn field(mut self, field: &str, field_type: FieldType) -> Self {
        self.field_types.insert(field.to_string(), field_type);
        self
    }

    /// Shorthand for a required, typed field.
    pub fn required(self, field: &str, field_type: FieldType) -> Self {
        self.require(field).field(field, field_type)
    }

    pub fn is_empty(&self) -> bool {
        self.required_fields.is_empty() && self.field_types.is_empty()
    }
}

/// Rules keyed by entity name. Entities without an entry are unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: HashMap<String, EntityRules>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, entity: &str, rules: EntityRules) -> Self {
        self.insert(entity, rules);
        self
    }

    pub fn insert(&mut self, entity: &str, rules: EntityRules) {
        self.rules.insert(entity.to_string(), rules);
    }

    pub fn get(&self, entity: &str) -> Option<&EntityRules> {
        self.rules.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
