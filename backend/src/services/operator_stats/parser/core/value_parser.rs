//! Value parser for operator statistics
//!
//! Field-level extraction from loosely typed profiler JSON. Every accessor
//! returns `Option`: a missing field and a field of the wrong shape are both
//! "absent", and the latter is logged at debug level only.

use serde_json::Value;
use std::collections::BTreeSet;

/// Parser for individual values inside operator blobs
pub struct ValueParser;

impl ValueParser {
    /// Normalize a VARIANT column into a JSON value
    ///
    /// Accepts a native value or a string holding a JSON document. Null, empty
    /// strings and undecodable strings all normalize to `None`.
    pub fn normalize_blob(value: Option<&Value>, field: &str) -> Option<Value> {
        match value? {
            Value::Null => None,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Null) => None,
                    Ok(decoded) => Some(decoded),
                    Err(e) => {
                        tracing::debug!("Skipping undecodable {} blob: {}", field, e);
                        None
                    }
                }
            }
            other => Some(other.clone()),
        }
    }

    /// Normalize the parent reference column into a set of operator ids
    ///
    /// Accepts `[1, 2]`, `"[1, 2]"` or null. Any element that is not a
    /// non-negative integer makes the whole reference absent.
    pub fn parse_parent_ids(value: Option<&Value>) -> Option<BTreeSet<u64>> {
        let normalized = Self::normalize_blob(value, "parent_operators")?;
        let items = match normalized.as_array() {
            Some(items) => items,
            None => {
                tracing::debug!("parent_operators is not a sequence: {}", normalized);
                return None;
            }
        };

        let mut parents = BTreeSet::new();
        for item in items {
            match Self::as_u64(item) {
                Some(id) => {
                    parents.insert(id);
                }
                None => {
                    tracing::debug!("parent_operators holds a non-integer element: {}", item);
                    return None;
                }
            }
        }
        Some(parents)
    }

    /// Walk a nested path (`["io", "bytes_scanned"]`) and read a u64
    pub fn u64_at(root: &Value, path: &[&str]) -> Option<u64> {
        let value = Self::lookup(root, path)?;
        let parsed = Self::as_u64(value);
        if parsed.is_none() {
            tracing::debug!("Field {} is not a non-negative integer: {}", path.join("."), value);
        }
        parsed
    }

    /// Walk a nested path and read an f64
    pub fn f64_at(root: &Value, path: &[&str]) -> Option<f64> {
        let value = Self::lookup(root, path)?;
        let parsed = Self::as_f64(value);
        if parsed.is_none() {
            tracing::debug!("Field {} is not numeric: {}", path.join("."), value);
        }
        parsed
    }

    /// Read a string field; numbers are rendered as text
    pub fn str_at(root: &Value, path: &[&str]) -> Option<String> {
        match Self::lookup(root, path)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::String(_) => None,
            Value::Number(n) => Some(n.to_string()),
            other => {
                tracing::debug!("Field {} is not a string: {}", path.join("."), other);
                None
            }
        }
    }

    /// Read a list of strings
    ///
    /// A scalar string is treated as a one-element list; non-string elements
    /// are skipped individually.
    pub fn str_list_at(root: &Value, path: &[&str]) -> Option<Vec<String>> {
        match Self::lookup(root, path)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        other => {
                            tracing::debug!(
                                "Skipping non-string element in {}: {}",
                                path.join("."),
                                other
                            );
                            None
                        }
                    })
                    .collect(),
            ),
            Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
            other => {
                tracing::debug!("Field {} is not a list: {}", path.join("."), other);
                None
            }
        }
    }

    /// Count the elements of a list field
    pub fn len_at(root: &Value, path: &[&str]) -> Option<usize> {
        match Self::lookup(root, path)? {
            Value::Array(items) => Some(items.len()),
            other => {
                tracing::debug!("Field {} is not a list: {}", path.join("."), other);
                None
            }
        }
    }

    fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
        let mut current = root;
        for key in path {
            current = current.get(key)?;
        }
        if current.is_null() { None } else { Some(current) }
    }

    /// Numbers may arrive as integers, floats or numeric strings
    fn as_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }
}
