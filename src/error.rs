//! Error types for the engine's fallible boundaries
//!
//! Validation failures and schema anomalies are data, not errors. These enums
//! only cover parsing a schema, injected transports and stores, and caller
//! precondition violations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Empty id: {0}")]
    EmptyId(String),
    #[error("Duplicate section id: {0}")]
    DuplicateSection(String),
    #[error("Duplicate field id: {0}")]
    DuplicateField(String),
    #[error("Section '{section}' has minInstances {min} > maxInstances {max}")]
    InstanceBounds {
        section: String,
        min: usize,
        max: usize,
    },
}

/// Failure of an injected network-like operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
}

/// Failure reported by an injected draft store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DraftError {
    #[error("Draft store unavailable: {0}")]
    Unavailable(String),
    #[error("Draft rejected: {0}")]
    Rejected(String),
    #[error("Draft decode error: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown section: {0}")]
    UnknownSection(String),
    #[error("Section is not repeatable: {0}")]
    NotRepeatable(String),
    #[error("Section '{section}' already has the maximum of {max} instances")]
    MaxInstances { section: String, max: usize },
    #[error("Section '{section}' requires at least {min} instances")]
    MinInstances { section: String, min: usize },
    #[error("Instance {index} out of range for section '{section}'")]
    InstanceOutOfRange { section: String, index: usize },
    #[error("Unknown field: {0}")]
    UnknownField(String),
}
