//! Record model for Switchyard.
//!
//! Defines the backend-agnostic types every other Switchyard crate depends on:
//! - [`Record`]: an ordered field name → JSON value mapping
//! - [`EntityRules`] / [`RuleSet`]: per-entity required fields and declared types
//! - [`Validator`]: rule checking plus type coercion for records read from a
//!   loosely typed backend (the spreadsheet store hands back text)
//!
//! Nothing here knows about a concrete backend. Adapters, migration and backup
//! all exchange [`Record`]s.

mod record;
mod schema;
mod validator;

pub use record::{is_blank, matches_filter, record_id, value_as_text, values_match, Filter, Record, ID_FIELD};
pub use schema::{EntityRules, FieldType, RuleSet};
pub use validator::{
    to_boolean, to_date, to_number, BatchValidation, InvalidRecord, ValidationOutcome, Validator,
};
