//! Leaf predicates of the filter tree

use crate::filter::FilterField;
use crate::query::Target;
use crate::record::{numeric_field, Record};
use serde_json::Value;

/// Passes records whose counter is strictly above a threshold
///
/// Only roles and repositories carry counters; other kinds always pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CountFilter {
    field: FilterField,
    threshold: f64,
}

impl CountFilter {
    pub fn new(field: FilterField, threshold: f64) -> Self {
        Self { field, threshold }
    }

    pub fn passed(&self, target: Target, record: &Record) -> bool {
        if !target.has_counts() {
            return true;
        }
        let key = self.field.record_key();
        match numeric_field(record, key) {
            Some(count) => count > self.threshold,
            None => {
                tracing::error!("Failed to parse response. Record has no numeric '{}'", key);
                false
            }
        }
    }
}

/// Passes records whose minimum Ansible version is at least `min_version`
#[derive(Debug, Clone, PartialEq)]
pub struct AnsibleVersionFilter {
    min_version: f64,
}

impl AnsibleVersionFilter {
    pub fn new(min_version: f64) -> Self {
        Self { min_version }
    }

    pub fn passed(&self, target: Target, record: &Record) -> bool {
        if !target.has_counts() {
            return true;
        }
        let version = match record.get(FilterField::Ansible.record_key()) {
            None => {
                tracing::error!("Failed to parse response. Record has no 'min_ansible_version'");
                return false;
            }
            Some(value) => parse_version_prefix(value),
        };
        version >= self.min_version
    }
}

/// Reads the leading `major.minor` of a version string as a float
///
/// `"2.0a1"` becomes `2.0`. Anything unparsable, including `null`, becomes
/// `0.0`.
pub(crate) fn parse_version_prefix(value: &Value) -> f64 {
    if let Some(number) = value.as_f64() {
        return number;
    }
    let parsed = value
        .as_str()
        .and_then(|s| s.get(..3).or(Some(s)))
        .and_then(|prefix| prefix.trim().parse::<f64>().ok());
    match parsed {
        Some(version) => version,
        None => {
            tracing::warn!("Cannot parse min_ansible_version ({}). Use 0.0 instead.", value);
            0.0
        }
    }
}
