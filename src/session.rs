//! Form Session
//!
//! Glue between a schema, the state store, the validation pipeline and the
//! condition resolver. Implements the collaborator flows: change, blur,
//! async validation, submit, and repeatable-section bookkeeping with schema
//! bounds enforced before anything is dispatched.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::diagnostics::{tracing_sink, SharedSink};
use crate::error::{SchemaError, SessionError};
use crate::options::{OptionsLoader, OptionsState};
use crate::resolver::ConditionResolver;
use crate::schema::{FieldSchema, FieldValue, FormSchema, FormValues, RuleKind, SectionSchema, Trigger};
use crate::state::{FieldKey, FormAction, FormState, FormStore};
use crate::validation::{AsyncOutcome, AsyncValidator, FieldValidationResult, ValidationTransport, Validator};

/// How a submit attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The handler accepted the values
    Submitted,
    /// Validation failed; the handler was not called
    Invalid { field_errors: BTreeMap<String, Vec<String>> },
    /// The handler reported a failure, recorded as a form-level error
    Failed { message: String },
}

/// One live form
pub struct FormSession {
    schema: Arc<FormSchema>,
    config: EngineConfig,
    store: FormStore,
    validator: Validator,
    resolver: ConditionResolver,
    transport: Option<Arc<dyn ValidationTransport>>,
    async_validators: Mutex<HashMap<String, AsyncValidator>>,
    sink: SharedSink,
}

impl FormSession {
    /// Check the schema, seed defaults and create minimum instances
    pub fn new(schema: FormSchema, config: EngineConfig) -> Result<Self, SchemaError> {
        schema.check()?;
        let store = FormStore::new(FormState::new(schema.initial_values()));
        let session = Self {
            schema: Arc::new(schema),
            config,
            store,
            validator: Validator::new(),
            resolver: ConditionResolver::new(),
            transport: None,
            async_validators: Mutex::new(HashMap::new()),
            sink: tracing_sink(),
        };
        session.seed_min_instances();
        info!("Form session '{}' started", session.schema.id);
        Ok(session)
    }

    /// Use a validator with registered custom validators
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator.with_sink(self.sink.clone());
        self
    }

    /// Transport for `async` rules; without one they are skipped
    pub fn with_transport(mut self, transport: Arc<dyn ValidationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Report diagnostics to `sink`
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.resolver = ConditionResolver::with_sink(sink.clone());
        self.validator = self.validator.with_sink(sink.clone());
        self.sink = sink;
        self
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn store(&self) -> &FormStore {
        &self.store
    }

    pub fn state(&self) -> Arc<FormState> {
        self.store.snapshot()
    }

    pub fn dispatch(&self, action: FormAction) {
        self.store.dispatch(action);
    }

    fn seed_min_instances(&self) {
        for section in self.schema.repeatable_sections() {
            for _ in 0..section.min_count() {
                self.store.dispatch(add_instance_action(section));
            }
        }
    }

    /// Every field key of the form, instances included, in schema order
    pub fn field_keys(&self) -> Vec<FieldKey> {
        let state = self.store.snapshot();
        self.keyed_fields(&state).into_iter().map(|(key, _)| key).collect()
    }

    fn keyed_fields(&self, state: &FormState) -> Vec<(FieldKey, &FieldSchema)> {
        let mut keys = Vec::new();
        for section in &self.schema.sections {
            if section.repeatable {
                for index in 0..state.section_instance_count(&section.id) {
                    for field in &section.fields {
                        keys.push((FieldKey::in_instance(field.id.as_str(), section.id.as_str(), index), field));
                    }
                }
            } else {
                keys.extend(section.fields.iter().map(|f| (FieldKey::new(f.id.as_str()), f)));
            }
        }
        keys
    }

    /// Ids of fields hidden by their own or their section's condition
    fn hidden_field_ids(&self, values: &FormValues) -> HashSet<&str> {
        let mut hidden = HashSet::new();
        for section in &self.schema.sections {
            let section_visible = section
                .show_when
                .as_ref()
                .map_or(true, |condition| self.resolver.evaluate(condition, values));
            for field in &section.fields {
                if !section_visible || !self.resolver.is_visible(field, values) {
                    hidden.insert(field.id.as_str());
                }
            }
        }
        hidden
    }

    /// Value keys of currently hidden fields
    pub fn hidden_fields(&self) -> HashSet<String> {
        let state = self.store.snapshot();
        let hidden = self.hidden_field_ids(&state.values);
        self.keyed_fields(&state)
            .into_iter()
            .filter(|(key, _)| hidden.contains(key.field.as_str()))
            .map(|(key, _)| key.value_key())
            .collect()
    }

    /// Keys of currently visible fields
    pub fn visible_field_keys(&self) -> Vec<FieldKey> {
        let state = self.store.snapshot();
        let hidden = self.hidden_field_ids(&state.values);
        self.keyed_fields(&state)
            .into_iter()
            .filter(|(key, _)| !hidden.contains(key.field.as_str()))
            .map(|(key, _)| key)
            .collect()
    }

    fn is_hidden(&self, key: &FieldKey, values: &FormValues) -> bool {
        self.hidden_field_ids(values).contains(key.field.as_str())
    }

    /// Drop errors left on fields that have since become hidden
    fn clear_hidden_errors(&self) {
        let state = self.store.snapshot();
        let hidden = self.hidden_field_ids(&state.values);
        for (key, _) in self.keyed_fields(&state) {
            if hidden.contains(key.field.as_str()) && state.field_state(&key).is_some_and(|f| f.has_errors()) {
                self.store.dispatch(FormAction::ClearFieldErrors { key });
            }
        }
    }

    /// Write a value and run the change-phase rules
    pub fn change(&self, key: impl Into<FieldKey>, value: impl Into<FieldValue>) -> FieldValidationResult {
        let key = key.into();
        if self.cancel_async(&key) {
            self.store.dispatch(FormAction::set_validating(key.clone(), false));
        }
        self.store.dispatch(FormAction::SetFieldValue {
            key: key.clone(),
            value: value.into(),
        });
        self.clear_hidden_errors();
        self.run_sync(&key, Trigger::Change)
    }

    /// Mark touched and run the blur-phase rules
    pub fn blur(&self, key: impl Into<FieldKey>) -> FieldValidationResult {
        let key = key.into();
        self.store.dispatch(FormAction::touch(key.clone()));
        self.run_sync(&key, Trigger::Blur)
    }

    fn run_sync(&self, key: &FieldKey, phase: Trigger) -> FieldValidationResult {
        let Some(field) = self.schema.get_field(&key.field) else {
            return FieldValidationResult::success();
        };
        let state = self.store.snapshot();
        if self.is_hidden(key, &state.values) {
            self.store.dispatch(FormAction::set_errors(key.clone(), Vec::new()));
            return FieldValidationResult::success();
        }

        let value = state.values.value_of(&key.value_key());
        let result = self
            .validator
            .validate_field_in_phase(&key.value_key(), &value, &field.validation, &state.values, phase);
        self.store
            .dispatch(FormAction::set_errors(key.clone(), result.errors.clone()));
        result
    }

    /// Run the field's async rules (debounced).
    ///
    /// Skipped while the field has sync errors. A `Cancelled` outcome means a
    /// newer call took over and nothing was written.
    pub async fn validate_field_async(&self, key: impl Into<FieldKey>) -> AsyncOutcome {
        let key = key.into();
        let Some(field) = self.schema.get_field(&key.field) else {
            return AsyncOutcome::Valid;
        };
        let state = self.store.snapshot();
        if !field.has_async_rules()
            || self.is_hidden(&key, &state.values)
            || state.field_state(&key).is_some_and(|f| f.has_errors())
        {
            return AsyncOutcome::Valid;
        }

        let value = state.values.value_of(&key.value_key());
        self.run_async(&key, field, value, true).await
    }

    async fn run_async(&self, key: &FieldKey, field: &FieldSchema, value: FieldValue, debounced: bool) -> AsyncOutcome {
        let Some(transport) = &self.transport else {
            debug!("No validation transport; async rules on {} skipped", key);
            return AsyncOutcome::Valid;
        };

        self.store.dispatch(FormAction::set_validating(key.clone(), true));
        let mut outcome = AsyncOutcome::Valid;
        for (index, rule) in field.validation.iter().enumerate() {
            let RuleKind::Async { url, debounce_ms } = &rule.kind else {
                continue;
            };
            let validator = {
                let mut validators = self.async_validators.lock();
                validators
                    .entry(async_slot(key, index))
                    .or_insert_with(|| {
                        let debounce = debounce_ms.unwrap_or(self.config.async_validation.debounce_ms);
                        AsyncValidator::new(url.as_str(), Duration::from_millis(debounce), transport.clone())
                            .with_timeout(self.config.async_validation.request_timeout())
                            .with_fallback_message(rule.failure_message())
                            .with_sink(self.sink.clone())
                    })
                    .clone()
            };

            let result = if debounced {
                validator.validate(value.clone()).await
            } else {
                validator.validate_now(value.clone()).await
            };
            match result {
                AsyncOutcome::Cancelled => return AsyncOutcome::Cancelled,
                AsyncOutcome::Valid => {}
                invalid => {
                    outcome = invalid;
                    break;
                }
            }
        }

        self.store.dispatch(FormAction::set_validating(key.clone(), false));
        if let AsyncOutcome::Invalid(message) = &outcome {
            self.store
                .dispatch(FormAction::set_errors(key.clone(), vec![message.clone()]));
        }
        outcome
    }

    /// Cancel async validation of one key; true when something was pending
    fn cancel_async(&self, key: &FieldKey) -> bool {
        let prefix = format!("{}#", key.value_key());
        let validators = self.async_validators.lock();
        let mut cancelled = false;
        for (slot, validator) in validators.iter() {
            if slot.starts_with(&prefix) && validator.is_pending() {
                validator.cancel();
                cancelled = true;
            }
        }
        cancelled
    }

    fn cancel_all_async(&self) {
        for validator in self.async_validators.lock().values() {
            validator.cancel();
        }
    }

    /// Validate every visible field and hand the values to `handler` when
    /// they pass
    pub async fn submit<F, Fut>(&self, handler: F) -> SubmitOutcome
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        self.store.dispatch(FormAction::SetSubmitting { submitting: true });
        self.clear_hidden_errors();
        let visible = self.visible_field_keys();

        if self.config.session.touch_all_on_submit {
            for key in &visible {
                self.store.dispatch(FormAction::touch(key.clone()));
            }
        }

        let state = self.store.snapshot();
        let mut field_errors = BTreeMap::new();
        let mut pending_async = Vec::new();

        for key in &visible {
            let Some(field) = self.schema.get_field(&key.field) else {
                continue;
            };
            if field.validation.is_empty() {
                continue;
            }
            let value = state.values.value_of(&key.value_key());
            let result = self.validator.validate_field_in_phase(
                &key.value_key(),
                &value,
                &field.validation,
                &state.values,
                Trigger::Submit,
            );
            self.store
                .dispatch(FormAction::set_errors(key.clone(), result.errors.clone()));

            if !result.is_valid {
                field_errors.insert(key.value_key(), result.errors);
            } else if field.has_async_rules() {
                pending_async.push((key.clone(), field, value));
            }
        }

        for (key, field, value) in pending_async {
            if let AsyncOutcome::Invalid(message) = self.run_async(&key, field, value, false).await {
                field_errors.insert(key.value_key(), vec![message]);
            }
        }

        let outcome = if !field_errors.is_empty() {
            info!("Submit of '{}' blocked: {} invalid fields", self.schema.id, field_errors.len());
            SubmitOutcome::Invalid { field_errors }
        } else {
            self.store.dispatch(FormAction::ClearFormErrors);
            let values = self.store.snapshot().values.clone();
            match handler(values).await {
                Ok(()) => {
                    info!("Form '{}' submitted", self.schema.id);
                    SubmitOutcome::Submitted
                }
                Err(message) => {
                    self.store.dispatch(FormAction::SetFormErrors {
                        errors: vec![message.clone()],
                    });
                    SubmitOutcome::Failed { message }
                }
            }
        };

        self.store.dispatch(FormAction::SetSubmitting { submitting: false });
        outcome
    }

    fn repeatable_section(&self, section_id: &str) -> Result<&SectionSchema, SessionError> {
        let section = self
            .schema
            .get_section(section_id)
            .ok_or_else(|| SessionError::UnknownSection(section_id.to_string()))?;
        if !section.repeatable {
            return Err(SessionError::NotRepeatable(section_id.to_string()));
        }
        Ok(section)
    }

    /// Append an instance seeded with defaults; returns its index
    pub fn add_instance(&self, section_id: &str) -> Result<usize, SessionError> {
        let section = self.repeatable_section(section_id)?;
        let count = self.store.snapshot().section_instance_count(section_id);
        if let Some(max) = section.max_instances {
            if count >= max {
                return Err(SessionError::MaxInstances {
                    section: section_id.to_string(),
                    max,
                });
            }
        }
        self.store.dispatch(add_instance_action(section));
        Ok(count)
    }

    /// Remove an instance; later instances shift down
    pub fn remove_instance(&self, section_id: &str, index: usize) -> Result<(), SessionError> {
        let section = self.repeatable_section(section_id)?;
        let count = self.store.snapshot().section_instance_count(section_id);
        if index >= count {
            return Err(SessionError::InstanceOutOfRange {
                section: section_id.to_string(),
                index,
            });
        }
        if count <= section.min_count() {
            return Err(SessionError::MinInstances {
                section: section_id.to_string(),
                min: section.min_count(),
            });
        }

        for position in index..count {
            for field in &section.fields {
                let key = FieldKey::in_instance(field.id.as_str(), section_id, position);
                if self.cancel_async(&key) {
                    self.store.dispatch(FormAction::set_validating(key, false));
                }
            }
        }
        self.store.dispatch(FormAction::RemoveSectionInstance {
            section: section_id.to_string(),
            index,
        });
        Ok(())
    }

    /// Back to the baseline; optionally recreate minimum instances
    pub fn reset(&self) {
        self.reset_with(None);
    }

    /// Reset to explicit values, which become the new baseline
    pub fn reset_to(&self, values: FormValues) {
        self.reset_with(Some(values));
    }

    fn reset_with(&self, values: Option<FormValues>) {
        self.cancel_all_async();
        self.store.dispatch(FormAction::ResetForm { values });
        if self.config.session.reseed_min_instances_on_reset {
            self.seed_min_instances();
        }
    }

    /// Options for a select-like field: static ones, or fetched through
    /// `loader` when the field has an options source
    pub async fn load_options(&self, loader: &OptionsLoader, field_id: &str) -> Result<Option<OptionsState>, SessionError> {
        let field = self
            .schema
            .get_field(field_id)
            .ok_or_else(|| SessionError::UnknownField(field_id.to_string()))?;
        match &field.options_source {
            Some(source) => {
                let values = self.store.snapshot().values.clone();
                Ok(loader.load(field_id, source, &values).await)
            }
            None => Ok(Some(OptionsState::Loaded(field.options.clone()))),
        }
    }
}

fn async_slot(key: &FieldKey, rule_index: usize) -> String {
    format!("{}#{}", key.value_key(), rule_index)
}

fn add_instance_action(section: &SectionSchema) -> FormAction {
    FormAction::AddSectionInstance {
        section: section.id.clone(),
        seed: section
            .fields
            .iter()
            .map(|f| (f.id.clone(), f.default_value.clone().unwrap_or_default()))
            .collect(),
    }
}
