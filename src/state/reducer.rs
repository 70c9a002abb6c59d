//! The pure reducer: `(state, action) -> state`
//!
//! Never validates, never performs I/O. Instance counts are not checked
//! against schema bounds here; callers enforce them before dispatching.

use tracing::debug;

use super::actions::FormAction;
use super::types::{instance_value_key, ConflictResolution, FieldKey, FieldState, FormState, SectionInstance};
use crate::schema::FormValues;

/// Apply `action` to `state`, producing the next snapshot
pub fn reduce(state: &FormState, action: FormAction) -> FormState {
    let mut next = state.clone();
    apply(&mut next, action);
    next
}

fn apply(state: &mut FormState, action: FormAction) {
    match action {
        FormAction::SetFieldValue { key, value } => {
            let value_key = key.value_key();
            let dirty = value != state.initial_values.value_of(&value_key);
            state.values.set(value_key, value.clone());
            if let Some(field) = field_state_mut(state, &key) {
                field.value = value;
                field.dirty = dirty;
                field.errors.clear();
            }
        }

        FormAction::SetFieldTouched { key, touched } => {
            if let Some(field) = field_state_mut(state, &key) {
                field.touched = touched;
            }
        }

        FormAction::SetFieldError { key, errors } => {
            if let Some(field) = field_state_mut(state, &key) {
                field.errors = errors;
            }
        }

        FormAction::SetFieldValidating { key, validating } => {
            if let Some(field) = field_state_mut(state, &key) {
                field.validating = validating;
            }
        }

        FormAction::ClearFieldErrors { key } => {
            if let Some(field) = existing_field_state_mut(state, &key) {
                field.errors.clear();
            }
        }

        FormAction::ClearAllErrors => {
            for field in all_field_states_mut(state) {
                field.errors.clear();
            }
        }

        FormAction::SetValues { values, is_initial } => {
            if is_initial {
                for (key, value) in values.iter() {
                    state.initial_values.set(key.clone(), value.clone());
                }
            }
            merge_values(state, values);
        }

        FormAction::ResetForm { values } => {
            let baseline = values.unwrap_or_else(|| state.initial_values.clone());
            state.fields = baseline
                .iter()
                .map(|(key, value)| (key.clone(), FieldState::with_value(value.clone())))
                .collect();
            state.values = baseline.clone();
            state.initial_values = baseline;
            state.repeatable_sections.clear();
            state.form_errors.clear();
            state.is_submitting = false;
        }

        FormAction::SetSubmitting { submitting } => {
            if submitting {
                state.submit_count += 1;
            }
            state.is_submitting = submitting;
        }

        FormAction::SetFormErrors { errors } => state.form_errors = errors,

        FormAction::ClearFormErrors => state.form_errors.clear(),

        FormAction::AddSectionInstance { section, seed } => {
            let repeat = state.repeatable_sections.entry(section).or_default();
            let index = repeat.instances.len();
            let mut instance = SectionInstance::default();
            for (field, value) in seed {
                if !value.is_absent() {
                    state.values.set(instance_value_key(&field, index), value.clone());
                }
                instance.fields.insert(field, FieldState::with_value(value));
            }
            repeat.instances.push(instance);
        }

        FormAction::RemoveSectionInstance { section, index } => remove_instance(state, &section, index),

        FormAction::AutosaveDraftLoaded { values } => {
            merge_values(state, values);
            state.autosave.draft_loaded = true;
        }

        FormAction::AutosaveLastSaved { timestamp } => {
            state.autosave.last_saved = Some(timestamp);
        }

        FormAction::AutosaveConflict {
            local_values,
            saved_values,
            local_timestamp,
            saved_timestamp,
            server_version,
        } => {
            let autosave = &mut state.autosave;
            autosave.has_conflict = true;
            autosave.local_values = Some(local_values);
            autosave.saved_values = Some(saved_values);
            autosave.local_timestamp = Some(local_timestamp);
            autosave.saved_timestamp = Some(saved_timestamp);
            autosave.server_version = server_version;
        }

        FormAction::AutosaveResolveConflict { resolution } => {
            let autosave = &mut state.autosave;
            let chosen = match resolution {
                ConflictResolution::Local => autosave.local_values.take(),
                ConflictResolution::Remote => autosave.saved_values.take(),
            };
            autosave.has_conflict = false;
            autosave.local_values = None;
            autosave.saved_values = None;
            autosave.local_timestamp = None;
            autosave.saved_timestamp = None;
            autosave.server_version = None;

            if let Some(values) = chosen {
                state.values = values;
                refresh_field_values(state);
            }
        }
    }
}

/// Field state for `key`, materialized with defaults on first write.
///
/// `None` only for an instance key whose instance does not exist.
fn field_state_mut<'a>(state: &'a mut FormState, key: &FieldKey) -> Option<&'a mut FieldState> {
    let current = state.values.value_of(&key.value_key());
    let fields = match &key.instance {
        None => &mut state.fields,
        Some(instance) => {
            let slot = state
                .repeatable_sections
                .get_mut(&instance.section)
                .and_then(|repeat| repeat.instances.get_mut(instance.index));
            match slot {
                Some(slot) => &mut slot.fields,
                None => {
                    debug!("Ignoring metadata for {}: no such instance", key);
                    return None;
                }
            }
        }
    };
    Some(
        fields
            .entry(key.field.clone())
            .or_insert_with(|| FieldState::with_value(current)),
    )
}

fn existing_field_state_mut<'a>(state: &'a mut FormState, key: &FieldKey) -> Option<&'a mut FieldState> {
    match &key.instance {
        None => state.fields.get_mut(&key.field),
        Some(instance) => state
            .repeatable_sections
            .get_mut(&instance.section)
            .and_then(|repeat| repeat.instances.get_mut(instance.index))
            .and_then(|slot| slot.fields.get_mut(&key.field)),
    }
}

fn all_field_states_mut(state: &mut FormState) -> impl Iterator<Item = &mut FieldState> {
    let scoped = state
        .repeatable_sections
        .values_mut()
        .flat_map(|repeat| repeat.instances.iter_mut())
        .flat_map(|instance| instance.fields.values_mut());
    state.fields.values_mut().chain(scoped)
}

/// Write `values` and recompute dirtiness against the baseline
fn merge_values(state: &mut FormState, values: FormValues) {
    for (value_key, value) in values {
        let key = state.resolve_key(&value_key);
        let dirty = value != state.initial_values.value_of(&value_key);
        state.values.set(value_key, value.clone());
        if let Some(field) = field_state_mut(state, &key) {
            field.value = value;
            field.dirty = dirty;
        }
    }
}

/// Re-sync every materialized field state with the current values
fn refresh_field_values(state: &mut FormState) {
    let keys: Vec<FieldKey> = state.field_states().map(|(key, _)| key).collect();
    for key in keys {
        let value_key = key.value_key();
        let value = state.values.value_of(&value_key);
        let dirty = value != state.initial_values.value_of(&value_key);
        if let Some(field) = existing_field_state_mut(state, &key) {
            field.value = value;
            field.dirty = dirty;
        }
    }
}

/// Remove instance `index` and shift the values of later instances down
fn remove_instance(state: &mut FormState, section: &str, index: usize) {
    let Some(repeat) = state.repeatable_sections.get_mut(section) else {
        debug!("Ignoring removal from unknown section {}", section);
        return;
    };
    let count = repeat.instances.len();
    if index >= count {
        debug!("Ignoring removal of instance {} of {} ({} instances)", index, section, count);
        return;
    }

    let mut fields: Vec<String> = repeat
        .instances
        .iter()
        .flat_map(|instance| instance.fields.keys().cloned())
        .collect();
    fields.sort();
    fields.dedup();

    repeat.instances.remove(index);

    for values in [&mut state.values, &mut state.initial_values] {
        shift_down(values, &fields, index, count);
    }
}

fn shift_down(values: &mut FormValues, fields: &[String], index: usize, count: usize) {
    for field in fields {
        values.remove(&instance_value_key(field, index));
        for j in index + 1..count {
            if let Some(value) = values.remove(&instance_value_key(field, j)) {
                values.set(instance_value_key(field, j - 1), value);
            }
        }
    }
}
