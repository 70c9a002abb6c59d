//! Form Engine - Declarative Form Runtime Core
//!
//! Interprets a form described as data:
//! - Visibility conditions are resolved against the current values
//! - Declarative rules validate fields synchronously, with server-side rules
//!   debounced and cancellable
//! - All form state flows through a pure reducer behind a single store
//! - Drafts are autosaved with conflict detection against the server copy

pub mod autosave;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod options;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod state;
pub mod tasks;
pub mod validation;

// Re-export schema types
pub use schema::{
    Condition, FieldSchema, FieldType, FieldValue, FormSchema, FormValues, Operator,
    OptionsSource, RuleKind, SectionSchema, SelectOption, Trigger, ValidationRule,
};

// Re-export engine components
pub use autosave::{AutosaveCoordinator, AutosavePhase, Draft, DraftStore, SaveOutcome, SaveReceipt};
pub use config::{AsyncValidationConfig, AutosaveConfig, EngineConfig, SessionConfig};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, SharedSink, TracingSink};
pub use error::{DraftError, SchemaError, SessionError, TransportError};
pub use options::{OptionsLoader, OptionsState, OptionsTransport};
pub use resolver::ConditionResolver;
pub use session::{FormSession, SubmitOutcome};

// Re-export state machine types
pub use state::{
    reduce, ConflictResolution, FieldKey, FieldState, FormAction, FormState, FormStore,
};

// Re-export validation types
pub use validation::{
    AsyncOutcome, AsyncValidator, CustomValidators, FieldValidationResult, FormValidationOptions,
    FormValidationResult, ValidationTransport, Validator,
};
