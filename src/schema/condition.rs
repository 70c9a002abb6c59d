//! Visibility Conditions
//!
//! Wire shapes: `{field, operator, value?}`, `{and: [...]}`, `{or: [...]}`,
//! `{not: {...}}`. Anything else deserializes to [`Condition::Unknown`] so a
//! malformed schema still loads; the resolver treats it as visible.

use serde::{Deserialize, Serialize};

/// Comparison operators for simple conditions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
    /// Operator name not understood by this engine
    Unknown(String),
}

impl Operator {
    /// Wire name of the operator
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::Contains => "contains",
            Operator::GreaterThan => "greaterThan",
            Operator::LessThan => "lessThan",
            Operator::IsEmpty => "isEmpty",
            Operator::IsNotEmpty => "isNotEmpty",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Unknown(name) => name,
        }
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "equals" => Operator::Equals,
            "notEquals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "greaterThan" => Operator::GreaterThan,
            "lessThan" => Operator::LessThan,
            "isEmpty" => Operator::IsEmpty,
            "isNotEmpty" => Operator::IsNotEmpty,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            _ => Operator::Unknown(value),
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_str().to_string()
    }
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCondition {
    /// Field id or dotted path into the values snapshot
    pub field: String,
    /// Comparison operator
    pub operator: Operator,
    /// Comparand; its meaning depends on the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A boolean expression over form values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// True iff every child is true
    And {
        #[serde(rename = "and")]
        children: Vec<Condition>,
    },
    /// True iff any child is true
    Or {
        #[serde(rename = "or")]
        children: Vec<Condition>,
    },
    /// Negation of the child
    Not {
        #[serde(rename = "not")]
        child: Box<Condition>,
    },
    /// Field comparison
    Simple(SimpleCondition),
    /// Unrecognised shape, kept verbatim for diagnostics
    Unknown(serde_json::Value),
}

impl Condition {
    /// Create a simple condition
    pub fn simple(
        field: impl Into<String>,
        operator: Operator,
        value: Option<serde_json::Value>,
    ) -> Self {
        Condition::Simple(SimpleCondition {
            field: field.into(),
            operator,
            value,
        })
    }

    /// `field == value`
    pub fn equals(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::simple(field, Operator::Equals, Some(value))
    }

    /// `field` is empty
    pub fn is_empty(field: impl Into<String>) -> Self {
        Self::simple(field, Operator::IsEmpty, None)
    }

    /// `field` is not empty
    pub fn is_not_empty(field: impl Into<String>) -> Self {
        Self::simple(field, Operator::IsNotEmpty, None)
    }

    /// Conjunction
    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And { children }
    }

    /// Disjunction
    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or { children }
    }

    /// Negation
    pub fn negate(child: Condition) -> Self {
        Condition::Not {
            child: Box::new(child),
        }
    }

    /// Field ids referenced anywhere in this tree
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::And { children } | Condition::Or { children } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Condition::Not { child } => child.collect_fields(out),
            Condition::Simple(simple) => out.push(&simple.field),
            Condition::Unknown(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple() {
        let cond: Condition =
            serde_json::from_value(json!({"field": "country", "operator": "equals", "value": "US"}))
                .unwrap();
        assert_eq!(cond, Condition::equals("country", json!("US")));
    }

    #[test]
    fn test_parse_nested() {
        let cond: Condition = serde_json::from_value(json!({
            "and": [
                {"field": "a", "operator": "isNotEmpty"},
                {"not": {"or": [{"field": "b", "operator": "in", "value": ["x", "y"]}]}}
            ]
        }))
        .unwrap();

        match &cond {
            Condition::And { children } => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Condition::Not { .. }));
            }
            other => panic!("unexpected shape: {:?}", other),
        }
        assert_eq!(cond.referenced_fields(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_operator_and_shape() {
        let cond: Condition =
            serde_json::from_value(json!({"field": "a", "operator": "startsWith", "value": "x"}))
                .unwrap();
        match cond {
            Condition::Simple(simple) => {
                assert_eq!(simple.operator, Operator::Unknown("startsWith".to_string()));
            }
            other => panic!("unexpected shape: {:?}", other),
        }

        let cond: Condition = serde_json::from_value(json!({"xor": []})).unwrap();
        assert!(matches!(cond, Condition::Unknown(_)));
    }

    #[test]
    fn test_operator_round_trip_name() {
        let json = serde_json::to_value(Condition::is_empty("notes")).unwrap();
        assert_eq!(json, json!({"field": "notes", "operator": "isEmpty"}));
    }
}
