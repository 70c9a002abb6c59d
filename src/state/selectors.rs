//! Derived values, computed from a snapshot and never stored

use std::collections::BTreeMap;

use super::types::{FieldKey, FieldState, FormState};

impl FormState {
    /// No field has any error
    pub fn is_valid(&self) -> bool {
        self.field_states().all(|(_, field)| !field.has_errors())
    }

    /// Some field differs from the baseline
    pub fn is_dirty(&self) -> bool {
        self.field_states().any(|(_, field)| field.dirty)
    }

    /// Some field has async validation in flight
    pub fn is_validating(&self) -> bool {
        self.field_states().any(|(_, field)| field.validating)
    }

    /// Errors of every failing field, by value key
    pub fn all_errors(&self) -> BTreeMap<String, Vec<String>> {
        self.field_states()
            .filter(|(_, field)| field.has_errors())
            .map(|(key, field)| (key.value_key(), field.errors.clone()))
            .collect()
    }

    /// Number of error messages across all fields
    pub fn error_count(&self) -> usize {
        self.field_states().map(|(_, field)| field.errors.len()).sum()
    }

    pub fn field_state(&self, key: &FieldKey) -> Option<&FieldState> {
        match &key.instance {
            None => self.fields.get(&key.field),
            Some(instance) => self
                .repeatable_sections
                .get(&instance.section)?
                .instances
                .get(instance.index)?
                .fields
                .get(&key.field),
        }
    }

    /// Value keys of touched fields
    pub fn touched_fields(&self) -> Vec<String> {
        self.field_states()
            .filter(|(_, field)| field.touched)
            .map(|(key, _)| key.value_key())
            .collect()
    }

    pub fn section_instance_count(&self, section: &str) -> usize {
        self.repeatable_sections
            .get(section)
            .map_or(0, |repeat| repeat.len())
    }
}
