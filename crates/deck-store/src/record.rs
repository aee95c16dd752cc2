//! Entity records
//!
//! A record is the JSON object a store returns for one entity. Identity is
//! derived from its fields by the diff layer and is never stored separately.

use serde_json::{Map, Value};

/// A single entity document
pub type EntityRecord = Map<String, Value>;

/// The server-assigned `id` of a record
pub fn record_id(record: &EntityRecord) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Human label of a record: `username` for consumers, otherwise `name`
pub fn record_label(record: &EntityRecord) -> Option<&str> {
    record
        .get("username")
        .and_then(Value::as_str)
        .or_else(|| record.get("name").and_then(Value::as_str))
}

/// Label of a reference value such as `{"name": "svc"}`, `{"id": "..."}` or `"svc"`
///
/// Names win over ids so a reference reads the same on both stores.
pub fn reference_label(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["name", "username", "id"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
