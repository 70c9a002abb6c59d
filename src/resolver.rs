//! Condition Resolver
//!
//! Pure boolean evaluation of visibility conditions against a values
//! snapshot. No state, no I/O. Malformed input degrades to "visible" and is
//! reported to the diagnostics sink.

use serde_json::Value as Json;

use crate::diagnostics::{tracing_sink, Diagnostic, SharedSink};
use crate::schema::{Condition, FieldSchema, FieldValue, FormValues, Operator, RuleKind, SimpleCondition};

/// Evaluates [`Condition`] trees
#[derive(Clone)]
pub struct ConditionResolver {
    sink: SharedSink,
}

impl Default for ConditionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionResolver {
    /// Resolver reporting to `tracing`
    pub fn new() -> Self {
        Self { sink: tracing_sink() }
    }

    /// Resolver reporting to the given sink
    pub fn with_sink(sink: SharedSink) -> Self {
        Self { sink }
    }

    /// Evaluate a condition tree
    pub fn evaluate(&self, condition: &Condition, values: &FormValues) -> bool {
        match condition {
            Condition::And { children } => children.iter().all(|c| self.evaluate(c, values)),
            Condition::Or { children } => children.iter().any(|c| self.evaluate(c, values)),
            Condition::Not { child } => !self.evaluate(child, values),
            Condition::Simple(simple) => self.evaluate_simple(simple, values),
            Condition::Unknown(raw) => {
                self.sink.report(Diagnostic::UnknownCondition {
                    shape: raw.to_string(),
                });
                true
            }
        }
    }

    fn evaluate_simple(&self, condition: &SimpleCondition, values: &FormValues) -> bool {
        let absent = FieldValue::Absent;
        let actual = values.lookup_path(&condition.field).unwrap_or(&absent);
        let null = Json::Null;
        let expected = condition.value.as_ref().unwrap_or(&null);

        match &condition.operator {
            Operator::Equals => actual.matches_json(expected),
            Operator::NotEquals => !actual.matches_json(expected),
            Operator::Contains => contains(actual, expected),
            Operator::GreaterThan => compare(actual, expected, |a, b| a > b),
            Operator::LessThan => compare(actual, expected, |a, b| a < b),
            Operator::IsEmpty => actual.is_empty(),
            Operator::IsNotEmpty => !actual.is_empty(),
            Operator::In => match expected {
                Json::Array(items) => items.iter().any(|item| actual.matches_json(item)),
                _ => false,
            },
            // A non-sequence comparand is treated as "not a member"
            Operator::NotIn => match expected {
                Json::Array(items) => !items.iter().any(|item| actual.matches_json(item)),
                _ => true,
            },
            Operator::Unknown(name) => {
                self.sink.report(Diagnostic::UnknownOperator {
                    field: condition.field.clone(),
                    operator: name.clone(),
                });
                true
            }
        }
    }

    /// Whether a field is visible: no condition, or its condition holds
    pub fn is_visible(&self, field: &FieldSchema, values: &FormValues) -> bool {
        field
            .show_when
            .as_ref()
            .map_or(true, |condition| self.evaluate(condition, values))
    }

    /// Ids of the visible fields, in input order
    pub fn visible_field_ids<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a FieldSchema>,
        values: &FormValues,
    ) -> Vec<String> {
        fields
            .into_iter()
            .filter(|f| self.is_visible(f, values))
            .map(|f| f.id.clone())
            .collect()
    }

    /// Ids of fields carrying a `required` rule whose condition is false
    pub fn hidden_required_field_ids<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a FieldSchema>,
        values: &FormValues,
    ) -> Vec<String> {
        fields
            .into_iter()
            .filter(|f| f.validation.iter().any(|r| matches!(r.kind, RuleKind::Required)))
            .filter(|f| !self.is_visible(f, values))
            .map(|f| f.id.clone())
            .collect()
    }
}

fn contains(actual: &FieldValue, expected: &Json) -> bool {
    match (actual, expected) {
        (FieldValue::String(haystack), Json::String(needle)) => haystack.contains(needle.as_str()),
        (FieldValue::List(items), Json::String(needle)) => items.iter().any(|i| i == needle),
        _ => false,
    }
}

fn compare(actual: &FieldValue, expected: &Json, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_number(), expected.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::schema::{FieldType, ValidationRule};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn cond(v: Json) -> Condition {
        serde_json::from_value(v).unwrap()
    }

    fn snapshot() -> FormValues {
        let mut address = BTreeMap::new();
        address.insert("country".to_string(), FieldValue::from("FR"));
        FormValues::new()
            .with("name", "Ada Lovelace")
            .with("age", 36)
            .with("zero", 0)
            .with("agree", false)
            .with("blank", "   ")
            .with("tags", vec!["rust", "forms"])
            .with("none", Vec::<String>::new())
            .with("address", FieldValue::Map(address))
    }

    #[test]
    fn test_equality() {
        let r = ConditionResolver::new();
        let v = snapshot();
        assert!(r.evaluate(&cond(json!({"field": "age", "operator": "equals", "value": 36})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "age", "operator": "equals", "value": "36"})), &v));
        assert!(r.evaluate(&cond(json!({"field": "age", "operator": "notEquals", "value": 35})), &v));
        assert!(r.evaluate(&cond(json!({"field": "missing", "operator": "equals"})), &v));
        assert!(r.evaluate(
            &cond(json!({"field": "address.country", "operator": "equals", "value": "FR"})),
            &v
        ));
    }

    #[test]
    fn test_contains() {
        let r = ConditionResolver::new();
        let v = snapshot();
        assert!(r.evaluate(&cond(json!({"field": "name", "operator": "contains", "value": "Love"})), &v));
        assert!(r.evaluate(&cond(json!({"field": "tags", "operator": "contains", "value": "rust"})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "tags", "operator": "contains", "value": "ru"})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "age", "operator": "contains", "value": "3"})), &v));
    }

    #[test]
    fn test_numeric_comparison() {
        let r = ConditionResolver::new();
        let v = snapshot();
        assert!(r.evaluate(&cond(json!({"field": "age", "operator": "greaterThan", "value": 18})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "age", "operator": "lessThan", "value": 18})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "name", "operator": "greaterThan", "value": 1})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "age", "operator": "greaterThan", "value": "1"})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "missing", "operator": "lessThan", "value": 1})), &v));
    }

    #[test]
    fn test_emptiness() {
        let r = ConditionResolver::new();
        let v = snapshot();
        let empty = |field: &str| r.evaluate(&Condition::is_empty(field), &v);

        assert!(!empty("zero"));
        assert!(!empty("agree"));
        assert!(empty("blank"));
        assert!(empty("none"));
        assert!(empty("missing"));
        assert!(empty("address.zip"));
        assert!(!empty("address"));
        assert!(r.evaluate(&Condition::is_not_empty("name"), &v));
    }

    #[test]
    fn test_membership_asymmetry() {
        let r = ConditionResolver::new();
        let v = snapshot();
        assert!(r.evaluate(&cond(json!({"field": "age", "operator": "in", "value": [18, 36]})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "age", "operator": "notIn", "value": [18, 36]})), &v));
        assert!(!r.evaluate(&cond(json!({"field": "age", "operator": "in", "value": 36})), &v));
        assert!(r.evaluate(&cond(json!({"field": "age", "operator": "notIn", "value": 36})), &v));
    }

    #[test]
    fn test_unknown_fails_open_with_diagnostic() {
        let sink = CollectingSink::new();
        let r = ConditionResolver::with_sink(sink.clone());
        let v = snapshot();

        assert!(r.evaluate(&cond(json!({"field": "age", "operator": "between", "value": [1, 2]})), &v));
        assert!(r.evaluate(&cond(json!({"xor": [{"field": "age", "operator": "isEmpty"}]})), &v));
        // Negating an unknown leaf still flips it
        assert!(!r.evaluate(&cond(json!({"not": {"field": "age", "operator": "between"}})), &v));

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], Diagnostic::UnknownOperator { operator, .. } if operator == "between"));
        assert!(matches!(&entries[1], Diagnostic::UnknownCondition { .. }));
    }

    #[test]
    fn test_combinators_agree_with_children() {
        let r = ConditionResolver::with_sink(CollectingSink::new());
        let v = snapshot();
        let leaves = vec![
            Condition::is_empty("blank"),
            Condition::is_empty("name"),
            Condition::equals("age", json!(36)),
            cond(json!({"field": "age", "operator": "lessThan", "value": 10})),
            cond(json!({"field": "tags", "operator": "contains", "value": "forms"})),
            cond(json!({"field": "x", "operator": "mystery"})),
        ];

        // Every non-empty window of leaves, plus nested combinations
        let mut trees: Vec<Condition> = leaves.clone();
        for start in 0..leaves.len() {
            for end in start + 1..=leaves.len() {
                let children = leaves[start..end].to_vec();
                trees.push(Condition::and(children.clone()));
                trees.push(Condition::or(children));
            }
        }
        trees.push(Condition::or(vec![
            Condition::and(leaves[..2].to_vec()),
            Condition::negate(leaves[3].clone()),
        ]));

        for tree in &trees {
            assert_eq!(r.evaluate(&Condition::negate(tree.clone()), &v), !r.evaluate(tree, &v));
        }

        for start in 0..trees.len().saturating_sub(3) {
            let children = trees[start..start + 3].to_vec();
            let each: Vec<bool> = children.iter().map(|c| r.evaluate(c, &v)).collect();
            assert_eq!(r.evaluate(&Condition::and(children.clone()), &v), each.iter().all(|b| *b));
            assert_eq!(r.evaluate(&Condition::or(children), &v), each.iter().any(|b| *b));
        }
    }

    #[test]
    fn test_visible_and_hidden_required() {
        let r = ConditionResolver::new();
        let fields = vec![
            FieldSchema::new("country", FieldType::Select),
            FieldSchema::new("state", FieldType::Select)
                .rule(ValidationRule::required())
                .show_when(Condition::equals("country", json!("US"))),
            FieldSchema::new("province", FieldType::Text)
                .show_when(Condition::equals("country", json!("CA"))),
        ];

        let us = FormValues::new().with("country", "US");
        assert_eq!(r.visible_field_ids(&fields, &us), vec!["country", "state"]);
        assert!(r.hidden_required_field_ids(&fields, &us).is_empty());

        let fr = FormValues::new().with("country", "FR");
        assert_eq!(r.visible_field_ids(&fields, &fr), vec!["country"]);
        assert_eq!(r.hidden_required_field_ids(&fields, &fr), vec!["state"]);
    }
}
