//! Decoded API records and field helpers
//!
//! A record is the JSON object of one item in a page's `results` list. The
//! crawler treats it as an opaque map; only the handful of fields needed for
//! filtering, de-duplication and dependency resolution are read here.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One decoded item from a page's result list
pub type Record = Map<String, Value>;

/// Returns the record's numeric `id`
pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

/// Returns the record's `name`
pub fn record_name(record: &Record) -> Option<&str> {
    record.get("name").and_then(Value::as_str)
}

/// Returns a numeric field as `f64`, accepting integers and floats
pub fn numeric_field(record: &Record, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64)
}

/// Returns `summary_fields.<key>` of the record
pub fn summary_field<'a>(record: &'a Record, key: &str) -> Option<&'a Value> {
    record.get("summary_fields").and_then(|s| s.get(key))
}

/// Qualified role name: `<namespace>.<name>`
pub fn role_qualified_name(record: &Record) -> Option<String> {
    let namespace = summary_field(record, "namespace")
        .and_then(|ns| ns.get("name"))
        .and_then(Value::as_str)?;
    let name = record_name(record)?;
    Some(format!("{}.{}", namespace, name))
}

/// A dependency reference listed in a role's summary fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub name: String,
    /// Present when the API embedded the referenced role's id
    pub id: Option<i64>,
}

impl DependencyRef {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Self {
                name: name.clone(),
                id: None,
            }),
            Value::Object(obj) => Some(Self {
                name: obj.get("name").and_then(Value::as_str)?.to_string(),
                id: obj.get("id").and_then(Value::as_i64),
            }),
            _ => None,
        }
    }
}

/// Dependency references of a role (`summary_fields.dependencies`)
///
/// Missing or malformed lists yield no dependencies.
pub fn role_dependencies(record: &Record) -> Vec<DependencyRef> {
    summary_field(record, "dependencies")
        .and_then(Value::as_array)
        .map(|deps| deps.iter().filter_map(DependencyRef::from_value).collect())
        .unwrap_or_default()
}

/// Parses an API timestamp into UTC
///
/// Accepts RFC 3339 as well as the `%Y-%m-%dT%H:%M:%S%.f%z` variant without
/// a colon in the offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
