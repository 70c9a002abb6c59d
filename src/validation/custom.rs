//! Custom validator registry
//!
//! `custom` rules reference validators by name. Applications register the
//! functions up front; an unregistered name is reported and passes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::schema::{FieldValue, FormValues};

/// A custom validator: `None` when the value passes, otherwise a message
pub type CustomValidatorFn = dyn Fn(&FieldValue, &FormValues) -> Option<String> + Send + Sync;

/// Named custom validators
#[derive(Clone, Default)]
pub struct CustomValidators {
    validators: HashMap<String, Arc<CustomValidatorFn>>,
}

impl fmt::Debug for CustomValidators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValidators")
            .field("names", &self.names())
            .finish()
    }
}

impl CustomValidators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, validator: F)
    where
        F: Fn(&FieldValue, &FormValues) -> Option<String> + Send + Sync + 'static,
    {
        self.validators.insert(name.into(), Arc::new(validator));
    }

    /// Builder pattern: register a validator
    pub fn with<F>(mut self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&FieldValue, &FormValues) -> Option<String> + Send + Sync + 'static,
    {
        self.register(name, validator);
        self
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.validators.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CustomValidatorFn>> {
        self.validators.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
