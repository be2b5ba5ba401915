//! Structural validation of raw task records.
//!
//! Records are checked as JSON values before they are deserialized on read
//! and after they are serialized on write, so the task file can never hold a
//! record that does not match the task shape. Only structure and types are
//! checked here; business rules (such as non-empty titles) belong to the
//! request handlers. The one collection-level rule is id uniqueness: two
//! records that answer to the same `/tasks/{id}` path are rejected.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Fields every task record must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 4] = ["id", "title", "completed", "createdAt"];

/// Type rule per field, checked in this order. Optional fields are only
/// checked when present.
const FIELD_RULES: [(&str, fn(&Value) -> bool); 7] = [
    ("id", is_task_id),
    ("title", Value::is_string),
    ("completed", Value::is_boolean),
    ("createdAt", Value::is_string),
    ("description", Value::is_string),
    ("updatedAt", Value::is_string),
    ("userId", Value::is_string),
];

// =============================================================================
// Schema Error
// =============================================================================

/// The way a record deviates from the task shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// The record is not a JSON object.
    NotAnObject,
    /// Required fields are absent.
    MissingFields(Vec<&'static str>),
    /// A field has the wrong JSON type.
    InvalidType(&'static str),
    /// The id was already used by an earlier record.
    DuplicateId(String),
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(formatter, "must be an object"),
            Self::MissingFields(fields) => {
                write!(formatter, "is missing required fields: {}", fields.join(", "))
            }
            Self::InvalidType(field) => write!(formatter, "has invalid {field} type"),
            Self::DuplicateId(id) => write!(formatter, "has duplicate id {id}"),
        }
    }
}

/// A record at `index` failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Task at index {index} {kind}")]
pub struct SchemaError {
    /// Position of the record within the collection.
    pub index: usize,
    /// What is wrong with the record.
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    #[must_use]
    pub const fn new(index: usize, kind: SchemaErrorKind) -> Self {
        Self { index, kind }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn is_task_id(value: &Value) -> bool {
    value.is_i64() || value.is_string()
}

/// Validates a single record against the task shape.
///
/// # Errors
///
/// Returns [`SchemaError`] if the record is not an object, lacks a required
/// field, or holds a field of the wrong type.
pub fn validate_task_record(record: &Value, index: usize) -> Result<(), SchemaError> {
    let Value::Object(fields) = record else {
        return Err(SchemaError::new(index, SchemaErrorKind::NotAnObject));
    };

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .into_iter()
        .filter(|field| !fields.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::new(
            index,
            SchemaErrorKind::MissingFields(missing),
        ));
    }

    match FIELD_RULES
        .iter()
        .find(|(field, accepts)| fields.get(*field).is_some_and(|value| !accepts(value)))
    {
        Some((field, _)) => Err(SchemaError::new(index, SchemaErrorKind::InvalidType(*field))),
        None => Ok(()),
    }
}

/// Path form of a record id. `1` and `"1"` share a key because both are
/// addressed by `/tasks/1`.
fn id_key(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Validates every record, stopping at the first failure, then checks that
/// no two records share an id.
///
/// # Errors
///
/// Returns the [`SchemaError`] of the first invalid record, or
/// [`SchemaErrorKind::DuplicateId`] at the index of the first repeated id.
pub fn validate_task_records(records: &[Value]) -> Result<(), SchemaError> {
    records
        .iter()
        .enumerate()
        .try_for_each(|(index, record)| validate_task_record(record, index))?;

    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| record.get("id").map(|id| (index, id_key(id))))
        .try_for_each(|(index, key)| {
            if seen.insert(key.clone()) {
                Ok(())
            } else {
                Err(SchemaError::new(index, SchemaErrorKind::DuplicateId(key)))
            }
        })
}

// =============================================================================
// Tests
// =============================================================================
