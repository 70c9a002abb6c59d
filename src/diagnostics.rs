//! Diagnostics Channel
//!
//! Schema anomalies (unknown operators, unusable rules, bad patterns) never
//! fail evaluation. They are reported here instead, so the resolver and the
//! validation pipeline stay free of ambient side effects:
//!
//! - [`TracingSink`] forwards every diagnostic to `tracing::warn!`
//! - [`CollectingSink`] keeps them in memory for tests and tooling

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A non-fatal anomaly found while interpreting a schema
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Simple condition with an operator this engine does not know
    UnknownOperator { field: String, operator: String },
    /// Condition object matching none of the known shapes
    UnknownCondition { shape: String },
    /// Rule with an unknown type or unusable `value`
    UnknownRule {
        field: String,
        rule_type: String,
        reason: String,
    },
    /// `pattern` rule whose expression does not compile
    InvalidPattern {
        field: String,
        pattern: String,
        error: String,
    },
    /// `custom` rule naming a validator nobody registered
    UnregisteredValidator { field: String, name: String },
    /// Async validation transport failed; the value was treated as valid
    AsyncTransportFailure { url: String, error: String },
    /// Async validation exceeded its ceiling; the value was treated as valid
    AsyncTimeout { url: String, timeout_ms: u64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownOperator { field, operator } => {
                write!(f, "unknown operator '{}' on field '{}', treated as visible", operator, field)
            }
            Diagnostic::UnknownCondition { shape } => {
                write!(f, "unknown condition shape {}, treated as visible", shape)
            }
            Diagnostic::UnknownRule { field, rule_type, reason } => {
                write!(f, "rule '{}' on field '{}' ignored: {}", rule_type, field, reason)
            }
            Diagnostic::InvalidPattern { field, pattern, error } => {
                write!(f, "invalid pattern '{}' on field '{}' ignored: {}", pattern, field, error)
            }
            Diagnostic::UnregisteredValidator { field, name } => {
                write!(f, "custom validator '{}' for field '{}' is not registered", name, field)
            }
            Diagnostic::AsyncTransportFailure { url, error } => {
                write!(f, "async validation via {} failed ({}), treated as valid", url, error)
            }
            Diagnostic::AsyncTimeout { url, timeout_ms } => {
                write!(f, "async validation via {} timed out after {} ms, treated as valid", url, timeout_ms)
            }
        }
    }
}

/// Receiver of diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Shared handle to a sink
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Sink that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!("form diagnostic: {}", diagnostic);
    }
}

/// Default sink used when none is supplied
pub fn tracing_sink() -> SharedSink {
    Arc::new(TracingSink)
}

/// Sink that records diagnostics in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of everything reported so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drain recorded diagnostics
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        let shared: SharedSink = sink.clone();

        shared.report(Diagnostic::UnknownCondition { shape: "{}".to_string() });
        assert_eq!(sink.len(), 1);

        let taken = sink.take();
        assert_eq!(taken.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::UnregisteredValidator {
            field: "vat".to_string(),
            name: "vatNumber".to_string(),
        };
        assert_eq!(d.to_string(), "custom validator 'vatNumber' for field 'vat' is not registered");
    }
}
