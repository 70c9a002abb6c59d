//! Validation Rules - Declarative Field Constraints
//!
//! Wire shape: `{type, message?, trigger?, value?, debounceMs?}`. The meaning
//! of `value` depends on `type` (threshold, pattern, validator name or URL).
//! Unknown types and malformed values still load, as [`RuleKind::Unknown`],
//! and are treated as passing by the pipeline.

use serde::{Deserialize, Serialize};

/// When a collaborator should run a rule.
///
/// Phases are ordered: a rule runs in every phase at or after its trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Change,
    Blur,
    Submit,
}

impl Trigger {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "change" => Some(Trigger::Change),
            "blur" => Some(Trigger::Blur),
            "submit" => Some(Trigger::Submit),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Change => "change",
            Trigger::Blur => "blur",
            Trigger::Submit => "submit",
        }
    }
}

/// The constraint a rule checks
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Value must be present
    Required,
    /// Minimum string length in characters
    MinLength(usize),
    /// Maximum string length in characters
    MaxLength(usize),
    /// String must match a regular expression
    Pattern(String),
    /// Minimum numeric value (inclusive)
    Min(f64),
    /// Maximum numeric value (inclusive)
    Max(f64),
    /// Well-formed email address
    Email,
    /// Plausible phone number
    Phone,
    /// Absolute URL
    Url,
    /// Externally registered validator, by name
    Custom(String),
    /// Server-side check at `url`
    Async {
        url: String,
        debounce_ms: Option<u64>,
    },
    /// Unrecognised type or unusable `value`
    Unknown { rule_type: String, reason: String },
}

/// A validation rule attached to a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRule", into = "RawRule")]
pub struct ValidationRule {
    /// What the rule checks
    pub kind: RuleKind,
    /// Message reported on failure (overrides the built-in message)
    pub message: Option<String>,
    /// When collaborators should run the rule
    pub trigger: Option<Trigger>,
}

impl ValidationRule {
    /// Create a rule of the given kind
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
            trigger: None,
        }
    }

    /// Create a required rule
    pub fn required() -> Self {
        Self::new(RuleKind::Required)
    }

    /// Create a min length rule
    pub fn min_length(len: usize) -> Self {
        Self::new(RuleKind::MinLength(len))
    }

    /// Create a max length rule
    pub fn max_length(len: usize) -> Self {
        Self::new(RuleKind::MaxLength(len))
    }

    /// Create a pattern rule
    pub fn pattern(regex: &str) -> Self {
        Self::new(RuleKind::Pattern(regex.to_string()))
    }

    /// Create a min value rule
    pub fn min(value: f64) -> Self {
        Self::new(RuleKind::Min(value))
    }

    /// Create a max value rule
    pub fn max(value: f64) -> Self {
        Self::new(RuleKind::Max(value))
    }

    /// Create an email rule
    pub fn email() -> Self {
        Self::new(RuleKind::Email)
    }

    /// Create a phone rule
    pub fn phone() -> Self {
        Self::new(RuleKind::Phone)
    }

    /// Create a URL rule
    pub fn url() -> Self {
        Self::new(RuleKind::Url)
    }

    /// Create a custom rule referencing a registered validator
    pub fn custom(name: &str) -> Self {
        Self::new(RuleKind::Custom(name.to_string()))
    }

    /// Create an async rule checked against `url`
    pub fn remote(url: &str) -> Self {
        Self::new(RuleKind::Async {
            url: url.to_string(),
            debounce_ms: None,
        })
    }

    /// Set the failure message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the trigger hint
    pub fn on(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Wire name of the rule type
    pub fn rule_type(&self) -> &str {
        match &self.kind {
            RuleKind::Required => "required",
            RuleKind::MinLength(_) => "minLength",
            RuleKind::MaxLength(_) => "maxLength",
            RuleKind::Pattern(_) => "pattern",
            RuleKind::Min(_) => "min",
            RuleKind::Max(_) => "max",
            RuleKind::Email => "email",
            RuleKind::Phone => "phone",
            RuleKind::Url => "url",
            RuleKind::Custom(_) => "custom",
            RuleKind::Async { .. } => "async",
            RuleKind::Unknown { rule_type, .. } => rule_type,
        }
    }

    /// Whether this rule only runs in the async pass
    pub fn is_async(&self) -> bool {
        matches!(self.kind, RuleKind::Async { .. })
    }

    /// Trigger with the default applied (rules without a hint run from blur on)
    pub fn effective_trigger(&self) -> Trigger {
        self.trigger.unwrap_or(Trigger::Blur)
    }

    /// Whether the rule should run in `phase`
    pub fn runs_in(&self, phase: Trigger) -> bool {
        self.effective_trigger() <= phase
    }

    /// Built-in message used when the rule carries none
    pub fn default_message(&self) -> String {
        match &self.kind {
            RuleKind::Required => "This field is required".to_string(),
            RuleKind::MinLength(n) => format!("Must be at least {} characters", n),
            RuleKind::MaxLength(n) => format!("Must be at most {} characters", n),
            RuleKind::Pattern(_) => "Invalid format".to_string(),
            RuleKind::Min(n) => format!("Must be at least {}", format_number(*n)),
            RuleKind::Max(n) => format!("Must be at most {}", format_number(*n)),
            RuleKind::Email => "Please enter a valid email address".to_string(),
            RuleKind::Phone => "Please enter a valid phone number".to_string(),
            RuleKind::Url => "Please enter a valid URL".to_string(),
            RuleKind::Custom(_) | RuleKind::Unknown { .. } => "Invalid value".to_string(),
            RuleKind::Async { .. } => "Validation failed".to_string(),
        }
    }

    /// The message to report when this rule fails
    pub fn failure_message(&self) -> String {
        self.message.clone().unwrap_or_else(|| self.default_message())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Rule as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    #[serde(rename = "type")]
    rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    debounce_ms: Option<u64>,
}

impl From<RawRule> for ValidationRule {
    fn from(raw: RawRule) -> Self {
        let unknown = |reason: &str| RuleKind::Unknown {
            rule_type: raw.rule_type.clone(),
            reason: reason.to_string(),
        };
        let length = || {
            raw.value
                .as_ref()
                .and_then(|v| v.as_u64())
                .and_then(|n| usize::try_from(n).ok())
        };
        let number = || raw.value.as_ref().and_then(|v| v.as_f64());
        let text = || raw.value.as_ref().and_then(|v| v.as_str()).map(String::from);

        let kind = match raw.rule_type.as_str() {
            "required" => RuleKind::Required,
            "minLength" => length()
                .map(RuleKind::MinLength)
                .unwrap_or_else(|| unknown("value must be a non-negative integer")),
            "maxLength" => length()
                .map(RuleKind::MaxLength)
                .unwrap_or_else(|| unknown("value must be a non-negative integer")),
            "pattern" => text()
                .map(RuleKind::Pattern)
                .unwrap_or_else(|| unknown("value must be a pattern string")),
            "min" => number()
                .map(RuleKind::Min)
                .unwrap_or_else(|| unknown("value must be a number")),
            "max" => number()
                .map(RuleKind::Max)
                .unwrap_or_else(|| unknown("value must be a number")),
            "email" => RuleKind::Email,
            "phone" => RuleKind::Phone,
            "url" => RuleKind::Url,
            "custom" => text()
                .map(RuleKind::Custom)
                .unwrap_or_else(|| unknown("value must name a registered validator")),
            "async" => text()
                .map(|url| RuleKind::Async {
                    url,
                    debounce_ms: raw.debounce_ms,
                })
                .unwrap_or_else(|| unknown("value must be an endpoint URL")),
            _ => unknown("unrecognised rule type"),
        };

        Self {
            kind,
            message: raw.message,
            trigger: raw.trigger.as_deref().and_then(Trigger::parse),
        }
    }
}

impl From<ValidationRule> for RawRule {
    fn from(rule: ValidationRule) -> Self {
        use serde_json::Value as Json;

        let rule_type = rule.rule_type().to_string();
        let (value, debounce_ms) = match rule.kind {
            RuleKind::MinLength(n) | RuleKind::MaxLength(n) => (Some(Json::from(n)), None),
            RuleKind::Pattern(p) => (Some(Json::String(p)), None),
            RuleKind::Min(n) | RuleKind::Max(n) => (Some(Json::from(n)), None),
            RuleKind::Custom(name) => (Some(Json::String(name)), None),
            RuleKind::Async { url, debounce_ms } => (Some(Json::String(url)), debounce_ms),
            _ => (None, None),
        };

        Self {
            rule_type,
            message: rule.message,
            trigger: rule.trigger.map(|t| t.as_str().to_string()),
            value,
            debounce_ms,
        }
    }
}
