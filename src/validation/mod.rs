//! Validation Pipeline
//!
//! - Built-in checks for the declarative rule kinds
//! - Named custom validators registered by the application
//! - Fail-fast synchronous pipeline with form-level aggregation
//! - Debounced, cancellable asynchronous validation through an injected transport

pub mod async_rule;
pub mod builtin;
pub mod custom;
pub mod validator;

pub use async_rule::{
    AsyncOutcome, AsyncValidationRequest, AsyncValidationResponse, AsyncValidator, ValidationTransport,
};
pub use custom::{CustomValidatorFn, CustomValidators};
pub use validator::{FieldValidationResult, FormValidationOptions, FormValidationResult, Validator};
