//! Schema Types - Form, Section and Field Definitions
//!
//! A form is described entirely as data: a tree of sections holding fields,
//! each with validation rules and an optional visibility condition. This is
//! the sole configuration surface of the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::condition::Condition;
use super::rules::{RuleKind, ValidationRule};
use super::value::{FieldValue, FormValues};
use crate::error::SchemaError;

/// Kind of input a field represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Password,
    Number,
    Tel,
    Url,
    Date,
    Select,
    Multiselect,
    Radio,
    Checkbox,
    Switch,
    File,
    Hidden,
    /// Forward-compatible catch-all for field types rendered elsewhere
    #[serde(other)]
    Other,
}

/// A selectable option of a select/radio field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

fn default_label_key() -> String {
    "label".to_string()
}

fn default_value_key() -> String {
    "value".to_string()
}

/// Remote source for a field's options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsSource {
    /// Endpoint; may contain a `{value}` placeholder
    pub url: String,
    /// Field whose current value fills the placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Record key holding the option label
    #[serde(default = "default_label_key")]
    pub label_key: String,
    /// Record key holding the option value
    #[serde(default = "default_value_key")]
    pub value_key: String,
}

impl OptionsSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depends_on: None,
            label_key: default_label_key(),
            value_key: default_value_key(),
        }
    }

    pub fn depending_on(mut self, field: impl Into<String>) -> Self {
        self.depends_on = Some(field.into());
        self
    }

    pub fn with_keys(mut self, label_key: &str, value_key: &str) -> Self {
        self.label_key = label_key.to_string();
        self.value_key = value_key.to_string();
        self
    }
}

/// A field in a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field id, unique within the form
    pub id: String,
    /// Field type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Validation rules, evaluated in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<ValidationRule>,
    /// Visibility condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_when: Option<Condition>,
    /// Initial value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<FieldValue>,
    /// Static options (select, radio, multiselect)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    /// Remote options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_source: Option<OptionsSource>,
}

impl FieldSchema {
    /// Create a new field
    pub fn new(id: &str, field_type: FieldType) -> Self {
        Self {
            id: id.to_string(),
            field_type,
            label: String::new(),
            validation: Vec::new(),
            show_when: None,
            default_value: None,
            options: Vec::new(),
            options_source: None,
        }
    }

    /// Set the label
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Add a validation rule
    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.validation.push(rule);
        self
    }

    /// Set the visibility condition
    pub fn show_when(mut self, condition: Condition) -> Self {
        self.show_when = Some(condition);
        self
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Set the remote options source
    pub fn with_options_source(mut self, source: OptionsSource) -> Self {
        self.options_source = Some(source);
        self
    }

    /// Check if field carries a `required` rule
    pub fn is_required(&self) -> bool {
        self.validation
            .iter()
            .any(|r| matches!(r.kind, RuleKind::Required))
    }

    /// Check if field has async rules
    pub fn has_async_rules(&self) -> bool {
        self.validation.iter().any(ValidationRule::is_async)
    }
}

/// A named group of fields, optionally repeatable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSchema {
    /// Section id, unique within the form
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Fields in order
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    /// Whether the section can be instantiated several times
    #[serde(default)]
    pub repeatable: bool,
    /// Minimum number of instances of a repeatable section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<usize>,
    /// Maximum number of instances of a repeatable section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<usize>,
    /// Visibility condition for the whole section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_when: Option<Condition>,
}

impl SectionSchema {
    /// Create a new section
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            fields: Vec::new(),
            repeatable: false,
            min_instances: None,
            max_instances: None,
            show_when: None,
        }
    }

    /// Add a field
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Make the section repeatable with the given bounds
    pub fn repeatable(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.repeatable = true;
        self.min_instances = min;
        self.max_instances = max;
        self
    }

    /// Set the visibility condition
    pub fn show_when(mut self, condition: Condition) -> Self {
        self.show_when = Some(condition);
        self
    }

    /// Get field by id
    pub fn get_field(&self, id: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Minimum instance count (zero when unset)
    pub fn min_count(&self) -> usize {
        self.min_instances.unwrap_or(0)
    }
}

/// Complete form definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    /// Form id
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Sections in order
    #[serde(default)]
    pub sections: Vec<SectionSchema>,
}

impl FormSchema {
    /// Create a new empty form
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            sections: Vec::new(),
        }
    }

    /// Add a section
    pub fn section(mut self, section: SectionSchema) -> Self {
        self.sections.push(section);
        self
    }

    /// Parse and check a schema from JSON
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: FormSchema = serde_json::from_str(json)?;
        schema.check()?;
        Ok(schema)
    }

    /// Check structural integrity: non-empty ids, ids unique within their
    /// scope, consistent instance bounds
    pub fn check(&self) -> Result<(), SchemaError> {
        if self.id.is_empty() {
            return Err(SchemaError::EmptyId("form".to_string()));
        }

        let mut section_ids = HashSet::new();
        let mut field_ids = HashSet::new();

        for section in &self.sections {
            if section.id.is_empty() {
                return Err(SchemaError::EmptyId(format!("section in form '{}'", self.id)));
            }
            if !section_ids.insert(section.id.as_str()) {
                return Err(SchemaError::DuplicateSection(section.id.clone()));
            }
            if let (Some(min), Some(max)) = (section.min_instances, section.max_instances) {
                if min > max {
                    return Err(SchemaError::InstanceBounds {
                        section: section.id.clone(),
                        min,
                        max,
                    });
                }
            }

            for field in &section.fields {
                if field.id.is_empty() {
                    return Err(SchemaError::EmptyId(format!("field in section '{}'", section.id)));
                }
                if !field_ids.insert(field.id.as_str()) {
                    return Err(SchemaError::DuplicateField(field.id.clone()));
                }
            }
        }

        Ok(())
    }

    /// Get section by id
    pub fn get_section(&self, id: &str) -> Option<&SectionSchema> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Get field by id, searching every section
    pub fn get_field(&self, id: &str) -> Option<&FieldSchema> {
        self.sections.iter().find_map(|s| s.get_field(id))
    }

    /// Section that owns a field
    pub fn section_of(&self, field_id: &str) -> Option<&SectionSchema> {
        self.sections.iter().find(|s| s.get_field(field_id).is_some())
    }

    /// All fields in schema order
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.sections.iter().flat_map(|s| s.fields.iter())
    }

    /// Repeatable sections in schema order
    pub fn repeatable_sections(&self) -> impl Iterator<Item = &SectionSchema> {
        self.sections.iter().filter(|s| s.repeatable)
    }

    /// Baseline values from the `defaultValue`s of non-repeatable fields
    pub fn initial_values(&self) -> FormValues {
        self.sections
            .iter()
            .filter(|s| !s.repeatable)
            .flat_map(|s| s.fields.iter())
            .filter_map(|f| f.default_value.clone().map(|v| (f.id.clone(), v)))
            .collect()
    }
}
