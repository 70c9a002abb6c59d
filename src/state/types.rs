//! Form state types
//!
//! A [`FormState`] is an immutable snapshot. Only the reducer produces new
//! snapshots; everything else reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::schema::{FieldValue, FormValues};

/// Position of a field inside a repeatable section
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceRef {
    pub section: String,
    pub index: usize,
}

/// Structured address of a field value
///
/// Renders as `field` or `field[index]` in a [`FormValues`] snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceRef>,
}

impl FieldKey {
    /// Key of a field outside any repeatable section
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            instance: None,
        }
    }

    /// Key of a field inside instance `index` of `section`
    pub fn in_instance(field: impl Into<String>, section: impl Into<String>, index: usize) -> Self {
        Self {
            field: field.into(),
            instance: Some(InstanceRef {
                section: section.into(),
                index,
            }),
        }
    }

    /// Key in the values snapshot
    pub fn value_key(&self) -> String {
        match &self.instance {
            Some(instance) => instance_value_key(&self.field, instance.index),
            None => self.field.clone(),
        }
    }

    /// Same field, different instance index
    pub fn at_index(&self, index: usize) -> Self {
        let mut key = self.clone();
        if let Some(instance) = key.instance.as_mut() {
            instance.index = index;
        }
        key
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value_key())
    }
}

impl From<&str> for FieldKey {
    fn from(field: &str) -> Self {
        FieldKey::new(field)
    }
}

impl From<String> for FieldKey {
    fn from(field: String) -> Self {
        FieldKey::new(field)
    }
}

pub(crate) fn instance_value_key(field: &str, index: usize) -> String {
    format!("{}[{}]", field, index)
}

/// Split `field[index]` into its parts
pub(crate) fn parse_instance_value_key(key: &str) -> Option<(&str, usize)> {
    let open = key.rfind('[')?;
    let index = key.strip_suffix(']')?.get(open + 1..)?.parse().ok()?;
    Some((&key[..open], index))
}

/// Per-field metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub value: FieldValue,
    pub touched: bool,
    pub dirty: bool,
    pub validating: bool,
    pub errors: Vec<String>,
}

impl FieldState {
    /// Fresh state holding `value`
    pub fn with_value(value: FieldValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// One repetition of a repeatable section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionInstance {
    /// Field id -> state
    pub fields: BTreeMap<String, FieldState>,
}

/// Instances of a repeatable section, indexed `0..N`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepeatableSectionState {
    pub instances: Vec<SectionInstance>,
}

impl RepeatableSectionState {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Autosave bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveState {
    pub draft_loaded: bool,
    /// Milliseconds since the Unix epoch
    pub last_saved: Option<u64>,
    pub has_conflict: bool,
    pub local_values: Option<FormValues>,
    pub saved_values: Option<FormValues>,
    pub local_timestamp: Option<u64>,
    pub saved_timestamp: Option<u64>,
    /// Version the store reported when the conflict was detected
    pub server_version: Option<u64>,
}

/// Which side wins a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    Local,
    Remote,
}

/// Complete state of one form session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub values: FormValues,
    /// State of fields outside repeatable sections, by field id
    pub fields: BTreeMap<String, FieldState>,
    pub repeatable_sections: BTreeMap<String, RepeatableSectionState>,
    pub initial_values: FormValues,
    pub is_submitting: bool,
    pub submit_count: u32,
    /// Errors not tied to a single field
    pub form_errors: Vec<String>,
    pub autosave: AutosaveState,
}

impl FormState {
    /// Fresh state whose values and baseline are `initial_values`
    pub fn new(initial_values: FormValues) -> Self {
        Self {
            values: initial_values.clone(),
            initial_values,
            ..Self::default()
        }
    }

    /// Every materialized field state with its key
    pub fn field_states(&self) -> impl Iterator<Item = (FieldKey, &FieldState)> {
        let top = self
            .fields
            .iter()
            .map(|(id, state)| (FieldKey::new(id.as_str()), state));
        let scoped = self.repeatable_sections.iter().flat_map(|(section, repeat)| {
            repeat.instances.iter().enumerate().flat_map(move |(index, instance)| {
                instance
                    .fields
                    .iter()
                    .map(move |(id, state)| (FieldKey::in_instance(id.as_str(), section.as_str(), index), state))
            })
        });
        top.chain(scoped)
    }

    /// Map a values-snapshot key back to a structured key.
    ///
    /// `f[i]` resolves to an instance key when some repeatable section has an
    /// instance `i` holding field `f`; anything else is a plain field key.
    pub fn resolve_key(&self, value_key: &str) -> FieldKey {
        if let Some((field, index)) = parse_instance_value_key(value_key) {
            let owner = self.repeatable_sections.iter().find(|(_, repeat)| {
                repeat
                    .instances
                    .get(index)
                    .is_some_and(|instance| instance.fields.contains_key(field))
            });
            if let Some((section, _)) = owner {
                return FieldKey::in_instance(field, section.as_str(), index);
            }
        }
        FieldKey::new(value_key)
    }
}
