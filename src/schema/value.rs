//! Field Values - The Uniform Value Model
//!
//! Every field kind (text, number, checkbox, multi-select, ...) stores its
//! data as a [`FieldValue`]. A [`FormValues`] snapshot maps value keys to
//! values; keys for repeatable-section fields are rendered as `field[index]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value held by a single field
///
/// Serialized untagged, so the JSON shape is the natural one:
/// `"text"`, `42`, `true`, `["a", "b"]`, `{"street": "..."}` or `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// No value (JSON `null` / missing)
    #[default]
    Absent,
    /// Boolean value (checkbox, switch)
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// String value
    String(String),
    /// Ordered sequence of strings (multi-select, checkbox group)
    List(Vec<String>),
    /// Nested record, reachable through dotted paths
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a list of strings
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check if value is absent
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Emptiness as used by the `isEmpty`/`isNotEmpty` condition operators.
    ///
    /// Absent is empty, a string is empty when it trims to nothing, a list is
    /// empty when it has no items. Numbers, booleans and records never are.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::String(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Number(_) | FieldValue::Bool(_) | FieldValue::Map(_) => false,
        }
    }

    /// Missing-ness as used by the `required` rule.
    ///
    /// Unlike [`is_empty`](Self::is_empty), `false` counts as missing (an
    /// unticked mandatory checkbox). Numeric zero is a real answer.
    pub fn is_missing(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::String(s) => s.trim().is_empty(),
            FieldValue::Bool(b) => !b,
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Number(_) | FieldValue::Map(_) => false,
        }
    }

    /// True for values that optional-field rules skip (absent or `""`)
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Structural equality against a raw JSON comparand.
    ///
    /// Numbers compare as `f64`, lists element-wise against JSON arrays of
    /// strings, and `Absent` equals `null`.
    pub fn matches_json(&self, other: &serde_json::Value) -> bool {
        use serde_json::Value as Json;
        match (self, other) {
            (FieldValue::Absent, Json::Null) => true,
            (FieldValue::Bool(a), Json::Bool(b)) => a == b,
            (FieldValue::Number(a), Json::Number(b)) => b.as_f64() == Some(*a),
            (FieldValue::String(a), Json::String(b)) => a == b,
            (FieldValue::List(a), Json::Array(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| y.as_str() == Some(x.as_str()))
            }
            (FieldValue::Map(a), Json::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|o| v.matches_json(o)))
            }
            _ => false,
        }
    }

    /// Short human-readable rendering used in logs and option URLs
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Absent => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            FieldValue::String(s) => s.clone(),
            FieldValue::List(items) => items.join(","),
            FieldValue::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::List(value.into_iter().map(String::from).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// A snapshot of form values (value key -> value)
///
/// Ordered, so serialization and fingerprints are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormValues {
    values: BTreeMap<String, FieldValue>,
}

impl FormValues {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder pattern: add a value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a value by exact key
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Get a value by exact key, treating missing keys as absent
    pub fn value_of(&self, key: &str) -> FieldValue {
        self.values.get(key).cloned().unwrap_or_default()
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.values.remove(key)
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over all entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    /// Iterate over all keys in order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve a dotted path.
    ///
    /// An exact key match wins (so `address.city` may be a flat key). Otherwise
    /// the first segment selects a value and every further segment is an exact
    /// key lookup into nested records. A missing link yields `None`.
    pub fn lookup_path(&self, path: &str) -> Option<&FieldValue> {
        if let Some(value) = self.values.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            match current {
                FieldValue::Map(entries) => current = entries.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Content fingerprint of the snapshot (BLAKE3 over canonical JSON)
    pub fn fingerprint(&self) -> [u8; 32] {
        let bytes = serde_json::to_vec(&self.values).unwrap_or_default();
        *blake3::hash(&bytes).as_bytes()
    }
}

impl FromIterator<(String, FieldValue)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FormValues {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
