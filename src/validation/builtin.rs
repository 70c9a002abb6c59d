//! Built-in validators
//!
//! Every check other than `required` passes on absent or empty-string input,
//! so optional fields are only constrained once the user enters something.

use regex::Regex;
use std::sync::LazyLock;

use crate::schema::FieldValue;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static PHONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9\s\-().]{7,20}$").ok());

/// Outcome of a single built-in check
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Pass,
    Fail,
    /// The rule itself is unusable; treated as a pass
    Broken(String),
}

impl From<bool> for Check {
    fn from(passed: bool) -> Self {
        if passed {
            Check::Pass
        } else {
            Check::Fail
        }
    }
}

pub fn required(value: &FieldValue) -> Check {
    (!value.is_missing()).into()
}

/// Character count, not bytes. Non-strings pass.
pub fn min_length(value: &FieldValue, min: usize) -> Check {
    match value {
        FieldValue::String(s) if !s.is_empty() => (s.chars().count() >= min).into(),
        _ => Check::Pass,
    }
}

pub fn max_length(value: &FieldValue, max: usize) -> Check {
    match value {
        FieldValue::String(s) if !s.is_empty() => (s.chars().count() <= max).into(),
        _ => Check::Pass,
    }
}

/// Compiles `pattern` on every call; a bad pattern is `Broken`
pub fn pattern(value: &FieldValue, pattern: &str) -> Check {
    let Some(text) = non_blank_str(value) else {
        return Check::Pass;
    };
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text).into(),
        Err(e) => Check::Broken(e.to_string()),
    }
}

pub fn min(value: &FieldValue, min: f64) -> Check {
    match value.as_number() {
        Some(n) => (n >= min).into(),
        None => Check::Pass,
    }
}

pub fn max(value: &FieldValue, max: f64) -> Check {
    match value.as_number() {
        Some(n) => (n <= max).into(),
        None => Check::Pass,
    }
}

pub fn email(value: &FieldValue) -> Check {
    matches_static(value, &EMAIL)
}

pub fn phone(value: &FieldValue) -> Check {
    let Some(text) = non_blank_str(value) else {
        return Check::Pass;
    };
    let digits = text.chars().filter(char::is_ascii_digit).count();
    match PHONE.as_ref() {
        Some(re) => (re.is_match(text) && digits >= 7).into(),
        None => Check::Pass,
    }
}

/// Absolute URL with a host
pub fn url(value: &FieldValue) -> Check {
    let Some(text) = non_blank_str(value) else {
        return Check::Pass;
    };
    match url::Url::parse(text) {
        Ok(parsed) => parsed.has_host().into(),
        Err(_) => Check::Fail,
    }
}

fn non_blank_str(value: &FieldValue) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn matches_static(value: &FieldValue, re: &LazyLock<Option<Regex>>) -> Check {
    match (non_blank_str(value), re.as_ref()) {
        (Some(text), Some(re)) => re.is_match(text).into(),
        _ => Check::Pass,
    }
}
