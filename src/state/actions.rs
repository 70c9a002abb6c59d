//! Intent messages accepted by the reducer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{ConflictResolution, FieldKey};
use crate::schema::{FieldValue, FormValues};

/// The closed set of state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormAction {
    /// Write a value; recomputes dirtiness and clears the field's errors
    SetFieldValue { key: FieldKey, value: FieldValue },
    SetFieldTouched { key: FieldKey, touched: bool },
    /// Replace the field's errors
    SetFieldError { key: FieldKey, errors: Vec<String> },
    SetFieldValidating { key: FieldKey, validating: bool },
    ClearFieldErrors { key: FieldKey },
    ClearAllErrors,
    /// Merge values; with `is_initial` they also become the baseline
    #[serde(rename_all = "camelCase")]
    SetValues { values: FormValues, is_initial: bool },
    /// Back to `values` (or the baseline), dropping every instance
    ResetForm {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<FormValues>,
    },
    SetSubmitting { submitting: bool },
    SetFormErrors { errors: Vec<String> },
    ClearFormErrors,
    /// Append an instance, optionally seeded with field values
    AddSectionInstance {
        section: String,
        #[serde(default)]
        seed: BTreeMap<String, FieldValue>,
    },
    /// Remove an instance; later instances shift down by one
    RemoveSectionInstance { section: String, index: usize },
    /// Apply a recovered draft (not as baseline)
    AutosaveDraftLoaded { values: FormValues },
    AutosaveLastSaved { timestamp: u64 },
    #[serde(rename_all = "camelCase")]
    AutosaveConflict {
        local_values: FormValues,
        saved_values: FormValues,
        local_timestamp: u64,
        saved_timestamp: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_version: Option<u64>,
    },
    AutosaveResolveConflict { resolution: ConflictResolution },
}

impl FormAction {
    /// Wire name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            FormAction::SetFieldValue { .. } => "SET_FIELD_VALUE",
            FormAction::SetFieldTouched { .. } => "SET_FIELD_TOUCHED",
            FormAction::SetFieldError { .. } => "SET_FIELD_ERROR",
            FormAction::SetFieldValidating { .. } => "SET_FIELD_VALIDATING",
            FormAction::ClearFieldErrors { .. } => "CLEAR_FIELD_ERRORS",
            FormAction::ClearAllErrors => "CLEAR_ALL_ERRORS",
            FormAction::SetValues { .. } => "SET_VALUES",
            FormAction::ResetForm { .. } => "RESET_FORM",
            FormAction::SetSubmitting { .. } => "SET_SUBMITTING",
            FormAction::SetFormErrors { .. } => "SET_FORM_ERRORS",
            FormAction::ClearFormErrors => "CLEAR_FORM_ERRORS",
            FormAction::AddSectionInstance { .. } => "ADD_SECTION_INSTANCE",
            FormAction::RemoveSectionInstance { .. } => "REMOVE_SECTION_INSTANCE",
            FormAction::AutosaveDraftLoaded { .. } => "AUTOSAVE_DRAFT_LOADED",
            FormAction::AutosaveLastSaved { .. } => "AUTOSAVE_LAST_SAVED",
            FormAction::AutosaveConflict { .. } => "AUTOSAVE_CONFLICT",
            FormAction::AutosaveResolveConflict { .. } => "AUTOSAVE_RESOLVE_CONFLICT",
        }
    }

    pub fn set_value(key: impl Into<FieldKey>, value: impl Into<FieldValue>) -> Self {
        FormAction::SetFieldValue {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn touch(key: impl Into<FieldKey>) -> Self {
        FormAction::SetFieldTouched {
            key: key.into(),
            touched: true,
        }
    }

    pub fn set_errors(key: impl Into<FieldKey>, errors: Vec<String>) -> Self {
        FormAction::SetFieldError {
            key: key.into(),
            errors,
        }
    }

    pub fn set_validating(key: impl Into<FieldKey>, validating: bool) -> Self {
        FormAction::SetFieldValidating {
            key: key.into(),
            validating,
        }
    }
}
