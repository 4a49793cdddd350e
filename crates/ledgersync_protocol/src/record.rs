//! Opaque upstream records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record returned by the upstream resource.
///
/// The record body is externally defined and passed through untouched. The
/// only field the sync machinery interprets is `id`, which serves as the
/// dedup key across pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates a record from its raw fields.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Creates a record from a JSON value, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Returns the value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the raw fields of this record.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the dedup key for this record, if it has one.
    ///
    /// An id is a non-empty string or a non-zero number, coerced to a
    /// string. Anything else (missing, empty, zero, null, nested) yields
    /// `None` and the record is excluded from the accumulated set; no
    /// synthetic ids are generated.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
