//! Synchronous validation pipeline
//!
//! Rules run strictly in schema order and stop at the first failure, so a
//! field reports at most one error per pass. `async` rules are skipped here;
//! see [`super::AsyncValidator`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::builtin::{self, Check};
use super::custom::CustomValidators;
use crate::diagnostics::{tracing_sink, Diagnostic, SharedSink};
use crate::schema::{FieldSchema, FieldValue, FormValues, RuleKind, Trigger, ValidationRule};

/// Result of validating one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidationResult {
    pub is_valid: bool,
    /// At most one message (fail-fast)
    pub errors: Vec<String>,
    /// The rule that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_rule: Option<ValidationRule>,
}

impl FieldValidationResult {
    /// Create a successful result
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            failed_rule: None,
        }
    }

    /// Create a failed result for `rule`
    pub fn failure(rule: &ValidationRule, message: String) -> Self {
        Self {
            is_valid: false,
            errors: vec![message],
            failed_rule: Some(rule.clone()),
        }
    }

    /// The reported message, if any
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

impl Default for FieldValidationResult {
    fn default() -> Self {
        Self::success()
    }
}

/// Which fields a form-level pass considers
#[derive(Debug, Clone, Default)]
pub struct FormValidationOptions {
    /// Only validate fields listed in `touched_fields`
    pub touched_only: bool,
    pub touched_fields: HashSet<String>,
    /// Fields to skip entirely (invisible fields)
    pub hidden_fields: HashSet<String>,
}

impl FormValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touched_only(mut self, touched: impl IntoIterator<Item = String>) -> Self {
        self.touched_only = true;
        self.touched_fields = touched.into_iter().collect();
        self
    }

    pub fn hidden(mut self, hidden: impl IntoIterator<Item = String>) -> Self {
        self.hidden_fields = hidden.into_iter().collect();
        self
    }
}

/// Result of a form-level pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormValidationResult {
    pub is_valid: bool,
    /// Field id -> messages, only for failing fields
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub error_count: usize,
}

impl FormValidationResult {
    pub fn success() -> Self {
        Self {
            is_valid: true,
            field_errors: BTreeMap::new(),
            error_count: 0,
        }
    }

    /// Record a field's result
    pub fn add_field_result(&mut self, field: &str, result: FieldValidationResult) {
        if result.is_valid {
            return;
        }
        self.error_count += result.errors.len();
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .extend(result.errors);
        self.is_valid = false;
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: FormValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.error_count += other.error_count;
        for (field, errors) in other.field_errors {
            self.field_errors.entry(field).or_default().extend(errors);
        }
    }
}

/// Runs field rules against values
#[derive(Clone)]
pub struct Validator {
    custom: CustomValidators,
    sink: SharedSink,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Create a validator with no custom validators, reporting to `tracing`
    pub fn new() -> Self {
        Self {
            custom: CustomValidators::new(),
            sink: tracing_sink(),
        }
    }

    /// Use the given custom validators
    pub fn with_custom(mut self, custom: CustomValidators) -> Self {
        self.custom = custom;
        self
    }

    /// Report diagnostics to the given sink
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn custom_validators(&self) -> &CustomValidators {
        &self.custom
    }

    pub fn custom_validators_mut(&mut self) -> &mut CustomValidators {
        &mut self.custom
    }

    /// Validate one field against every sync rule
    pub fn validate_field(
        &self,
        field_id: &str,
        value: &FieldValue,
        rules: &[ValidationRule],
        values: &FormValues,
    ) -> FieldValidationResult {
        self.run_rules(field_id, value, rules.iter(), values)
    }

    /// Validate one field against the sync rules that run in `phase`
    pub fn validate_field_in_phase(
        &self,
        field_id: &str,
        value: &FieldValue,
        rules: &[ValidationRule],
        values: &FormValues,
        phase: Trigger,
    ) -> FieldValidationResult {
        self.run_rules(field_id, value, rules.iter().filter(|r| r.runs_in(phase)), values)
    }

    fn run_rules<'a>(
        &self,
        field_id: &str,
        value: &FieldValue,
        rules: impl Iterator<Item = &'a ValidationRule>,
        values: &FormValues,
    ) -> FieldValidationResult {
        for rule in rules.filter(|r| !r.is_async()) {
            if let Some(message) = self.check_rule(field_id, value, rule, values) {
                return FieldValidationResult::failure(rule, message);
            }
        }
        FieldValidationResult::success()
    }

    /// Check a single rule; `Some(message)` on failure
    fn check_rule(
        &self,
        field_id: &str,
        value: &FieldValue,
        rule: &ValidationRule,
        values: &FormValues,
    ) -> Option<String> {
        let check = match &rule.kind {
            RuleKind::Required => builtin::required(value),
            RuleKind::MinLength(n) => builtin::min_length(value, *n),
            RuleKind::MaxLength(n) => builtin::max_length(value, *n),
            RuleKind::Pattern(p) => match builtin::pattern(value, p) {
                Check::Broken(error) => {
                    self.sink.report(Diagnostic::InvalidPattern {
                        field: field_id.to_string(),
                        pattern: p.clone(),
                        error,
                    });
                    Check::Pass
                }
                other => other,
            },
            RuleKind::Min(n) => builtin::min(value, *n),
            RuleKind::Max(n) => builtin::max(value, *n),
            RuleKind::Email => builtin::email(value),
            RuleKind::Phone => builtin::phone(value),
            RuleKind::Url => builtin::url(value),
            RuleKind::Custom(name) => {
                return match self.custom.get(name) {
                    Some(validator) => validator(value, values)
                        .map(|message| rule.message.clone().unwrap_or(message)),
                    None => {
                        self.sink.report(Diagnostic::UnregisteredValidator {
                            field: field_id.to_string(),
                            name: name.clone(),
                        });
                        None
                    }
                };
            }
            RuleKind::Async { .. } => Check::Pass,
            RuleKind::Unknown { rule_type, reason } => {
                self.sink.report(Diagnostic::UnknownRule {
                    field: field_id.to_string(),
                    rule_type: rule_type.clone(),
                    reason: reason.clone(),
                });
                Check::Pass
            }
        };

        match check {
            Check::Fail => Some(rule.failure_message()),
            Check::Pass | Check::Broken(_) => None,
        }
    }

    /// Validate every field with rules, honouring `options`
    pub fn validate_form<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a FieldSchema>,
        values: &FormValues,
        options: &FormValidationOptions,
    ) -> FormValidationResult {
        let mut result = FormValidationResult::success();

        for field in fields {
            if field.validation.is_empty() || options.hidden_fields.contains(&field.id) {
                continue;
            }
            if options.touched_only && !options.touched_fields.contains(&field.id) {
                continue;
            }

            let value = values.value_of(&field.id);
            let field_result = self.validate_field(&field.id, &value, &field.validation, values);
            result.add_field_result(&field.id, field_result);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::schema::FieldType;

    #[test]
    fn test_fail_fast_reports_first_failure_only() {
        let validator = Validator::new();
        let rules = vec![ValidationRule::min_length(3), ValidationRule::pattern("^[a-z]+$")];
        let values = FormValues::new();

        let result = validator.validate_field("user", &"a1".into(), &rules, &values);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["Must be at least 3 characters"]);
        assert_eq!(result.failed_rule, Some(rules[0].clone()));

        // Exactly the minimum length passes, so the pattern is what fails here
        let result = validator.validate_field("user", &"ab1".into(), &rules, &values);
        assert_eq!(result.errors, vec!["Invalid format"]);
        assert_eq!(result.failed_rule, Some(rules[1].clone()));

        let result = validator.validate_field("user", &"abc1".into(), &rules, &values);
        assert_eq!(result.errors, vec!["Invalid format"]);
        assert_eq!(result.failed_rule, Some(rules[1].clone()));

        assert!(validator.validate_field("user", &"abc".into(), &rules, &values).is_valid);
    }

    #[test]
    fn test_custom_message_wins() {
        let validator = Validator::new();
        let rules = vec![ValidationRule::required().with_message("Tell us your name")];
        let result = validator.validate_field("name", &FieldValue::Absent, &rules, &FormValues::new());
        assert_eq!(result.first_error(), Some("Tell us your name"));
    }

    #[test]
    fn test_async_rules_skipped() {
        let validator = Validator::new();
        let rules = vec![ValidationRule::remote("https://api.example.com/username")];
        assert!(validator.validate_field("u", &"taken".into(), &rules, &FormValues::new()).is_valid);
    }

    #[test]
    fn test_anomalies_pass_with_diagnostics() {
        let sink = CollectingSink::new();
        let validator = Validator::new().with_sink(sink.clone());
        let rules: Vec<ValidationRule> = serde_json::from_value(serde_json::json!([
            {"type": "pattern", "value": "([a-z"},
            {"type": "custom", "value": "vatNumber"},
            {"type": "luhn"}
        ]))
        .unwrap();

        let result = validator.validate_field("vat", &"x".into(), &rules, &FormValues::new());
        assert!(result.is_valid);

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0], Diagnostic::InvalidPattern { .. }));
        assert!(matches!(entries[1], Diagnostic::UnregisteredValidator { .. }));
        assert!(matches!(entries[2], Diagnostic::UnknownRule { .. }));
    }

    #[test]
    fn test_custom_validator_sees_form_values() {
        let custom = CustomValidators::new().with("sameAsPassword", |value, values| {
            (value != &values.value_of("password")).then(|| "Passwords differ".to_string())
        });
        let validator = Validator::new().with_custom(custom);
        let rules = vec![ValidationRule::custom("sameAsPassword")];
        let values = FormValues::new().with("password", "s3cret");

        assert!(validator.validate_field("confirm", &"s3cret".into(), &rules, &values).is_valid);
        let result = validator.validate_field("confirm", &"nope".into(), &rules, &values);
        assert_eq!(result.first_error(), Some("Passwords differ"));

        let overridden = vec![ValidationRule::custom("sameAsPassword").with_message("Mismatch")];
        let result = validator.validate_field("confirm", &"nope".into(), &overridden, &values);
        assert_eq!(result.first_error(), Some("Mismatch"));
    }

    #[test]
    fn test_phase_filtering() {
        let validator = Validator::new();
        let rules = vec![
            ValidationRule::required(),
            ValidationRule::min_length(5).on(Trigger::Change),
        ];
        let values = FormValues::new();

        let on_change = validator.validate_field_in_phase("f", &"".into(), &rules, &values, Trigger::Change);
        assert!(on_change.is_valid);
        let on_change = validator.validate_field_in_phase("f", &"abc".into(), &rules, &values, Trigger::Change);
        assert_eq!(on_change.first_error(), Some("Must be at least 5 characters"));
        let on_blur = validator.validate_field_in_phase("f", &"".into(), &rules, &values, Trigger::Blur);
        assert_eq!(on_blur.first_error(), Some("This field is required"));
    }

    #[test]
    fn test_validate_form_options() {
        let validator = Validator::new();
        let fields = vec![
            FieldSchema::new("name", FieldType::Text).rule(ValidationRule::required()),
            FieldSchema::new("email", FieldType::Email)
                .rule(ValidationRule::required())
                .rule(ValidationRule::email()),
            FieldSchema::new("state", FieldType::Select).rule(ValidationRule::required()),
            FieldSchema::new("notes", FieldType::Textarea),
        ];
        let values = FormValues::new().with("email", "not-an-email");

        let all = validator.validate_form(&fields, &values, &FormValidationOptions::new());
        assert!(!all.is_valid);
        assert_eq!(all.error_count, 3);
        assert_eq!(all.field_errors["email"], vec!["Please enter a valid email address"]);
        assert!(!all.field_errors.contains_key("notes"));

        let visible = FormValidationOptions::new().hidden(vec!["state".to_string()]);
        let result = validator.validate_form(&fields, &values, &visible);
        assert_eq!(result.error_count, 2);
        assert!(!result.field_errors.contains_key("state"));

        let touched = FormValidationOptions::new().touched_only(vec!["email".to_string()]);
        let result = validator.validate_form(&fields, &values, &touched);
        assert_eq!(result.field_errors.keys().collect::<Vec<_>>(), vec!["email"]);
    }

    #[test]
    fn test_merge() {
        let mut a = FormValidationResult::success();
        a.add_field_result("x", FieldValidationResult::failure(&ValidationRule::required(), "req".into()));
        let mut b = FormValidationResult::success();
        b.add_field_result("y", FieldValidationResult::success());

        b.merge(a);
        assert!(!b.is_valid);
        assert_eq!(b.error_count, 1);
    }
}
