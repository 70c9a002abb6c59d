//! Asynchronous (server-side) validation
//!
//! An [`AsyncValidator`] is bound to one endpoint and one logical target.
//! Calls are debounced: a call arriving while a previous one is still waiting
//! or in flight supersedes it, and the superseded call resolves to
//! [`AsyncOutcome::Cancelled`] so the caller can discard it.
//!
//! Transport failures and timeouts resolve to [`AsyncOutcome::Valid`]. Losing
//! connectivity never blocks a submission.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::diagnostics::{tracing_sink, Diagnostic, SharedSink};
use crate::error::TransportError;
use crate::schema::FieldValue;
use crate::tasks::TaskSlots;

/// Body sent to the validation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncValidationRequest {
    pub value: FieldValue,
}

/// Body returned by the validation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncValidationResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AsyncValidationResponse {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Injected network seam for async validation
pub trait ValidationTransport: Send + Sync {
    fn validate(
        &self,
        url: &str,
        request: AsyncValidationRequest,
    ) -> BoxFuture<'static, Result<AsyncValidationResponse, TransportError>>;
}

/// Result of one async validation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncOutcome {
    Valid,
    Invalid(String),
    /// Superseded or cancelled; the result must be discarded
    Cancelled,
}

impl AsyncOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AsyncOutcome::Cancelled)
    }

    /// The error message, for `Invalid`
    pub fn error(&self) -> Option<&str> {
        match self {
            AsyncOutcome::Invalid(message) => Some(message),
            _ => None,
        }
    }
}

/// Debounced, cancellable validator for one endpoint
#[derive(Clone)]
pub struct AsyncValidator {
    url: String,
    debounce: Duration,
    timeout: Option<Duration>,
    fallback_message: String,
    transport: Arc<dyn ValidationTransport>,
    slots: TaskSlots<()>,
    sink: SharedSink,
}

impl AsyncValidator {
    pub fn new(url: impl Into<String>, debounce: Duration, transport: Arc<dyn ValidationTransport>) -> Self {
        Self {
            url: url.into(),
            debounce,
            timeout: None,
            fallback_message: "Validation failed".to_string(),
            transport,
            slots: TaskSlots::new(),
            sink: tracing_sink(),
        }
    }

    /// Give up on a request after `timeout`, treating the value as valid
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Message used when the server rejects a value without one
    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Whether a call is waiting or in flight
    pub fn is_pending(&self) -> bool {
        self.slots.is_active(&())
    }

    /// Debounced validation
    pub async fn validate(&self, value: FieldValue) -> AsyncOutcome {
        self.run(value, self.debounce).await
    }

    /// Validation without the debounce delay (still supersedes pending calls)
    pub async fn validate_now(&self, value: FieldValue) -> AsyncOutcome {
        self.run(value, Duration::ZERO).await
    }

    /// Cancel the pending call, if any
    pub fn cancel(&self) {
        if self.slots.cancel(&()) {
            debug!("Async validation via {} cancelled", self.url);
        }
    }

    async fn run(&self, value: FieldValue, delay: Duration) -> AsyncOutcome {
        let ticket = self.slots.begin(());
        let token = ticket.token().clone();

        if !delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return AsyncOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let request = self
            .transport
            .validate(&self.url, AsyncValidationRequest { value });

        let outcome = tokio::select! {
            _ = token.cancelled() => AsyncOutcome::Cancelled,
            result = self.with_ceiling(request) => self.interpret(result),
        };

        self.slots.finish(&ticket);
        if token.is_cancelled() {
            return AsyncOutcome::Cancelled;
        }
        outcome
    }

    async fn with_ceiling(
        &self,
        request: BoxFuture<'static, Result<AsyncValidationResponse, TransportError>>,
    ) -> Result<AsyncValidationResponse, TransportError> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(limit.as_millis() as u64)),
            },
            None => request.await,
        }
    }

    fn interpret(&self, result: Result<AsyncValidationResponse, TransportError>) -> AsyncOutcome {
        match result {
            Ok(response) if response.valid => AsyncOutcome::Valid,
            Ok(response) => {
                AsyncOutcome::Invalid(response.message.unwrap_or_else(|| self.fallback_message.clone()))
            }
            Err(TransportError::Timeout(timeout_ms)) => {
                self.sink.report(Diagnostic::AsyncTimeout {
                    url: self.url.clone(),
                    timeout_ms,
                });
                AsyncOutcome::Valid
            }
            Err(error) => {
                self.sink.report(Diagnostic::AsyncTransportFailure {
                    url: self.url.clone(),
                    error: error.to_string(),
                });
                AsyncOutcome::Valid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use parking_lot::Mutex;

    /// Records every request and answers "taken" for the value `"admin"`
    #[derive(Default)]
    struct MockTransport {
        calls: Mutex<Vec<FieldValue>>,
        fail_with: Option<TransportError>,
        delay: Option<Duration>,
    }

    impl ValidationTransport for MockTransport {
        fn validate(
            &self,
            _url: &str,
            request: AsyncValidationRequest,
        ) -> BoxFuture<'static, Result<AsyncValidationResponse, TransportError>> {
            self.calls.lock().push(request.value.clone());
            let fail_with = self.fail_with.clone();
            let delay = self.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if let Some(error) = fail_with {
                    return Err(error);
                }
                if request.value == FieldValue::from("admin") {
                    Ok(AsyncValidationResponse::invalid("Username is taken"))
                } else {
                    Ok(AsyncValidationResponse::valid())
                }
            })
        }
    }

    fn validator(transport: Arc<MockTransport>) -> AsyncValidator {
        AsyncValidator::new("https://api.example.com/username", Duration::from_millis(300), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_keeps_last_call() {
        let transport = Arc::new(MockTransport::default());
        let v = validator(transport.clone());

        let first = tokio::spawn({
            let v = v.clone();
            async move { v.validate("adm".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn({
            let v = v.clone();
            async move { v.validate("admin".into()).await }
        });

        assert_eq!(first.await.unwrap(), AsyncOutcome::Cancelled);
        assert_eq!(second.await.unwrap(), AsyncOutcome::Invalid("Username is taken".to_string()));
        assert_eq!(*transport.calls.lock(), vec![FieldValue::from("admin")]);
        assert!(!v.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_result() {
        let transport = Arc::new(MockTransport {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let v = validator(transport.clone());

        let pending = tokio::spawn({
            let v = v.clone();
            async move { v.validate_now("admin".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        v.cancel();

        assert_eq!(pending.await.unwrap(), AsyncOutcome::Cancelled);
        assert_eq!(transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_open() {
        let sink = CollectingSink::new();
        let transport = Arc::new(MockTransport {
            fail_with: Some(TransportError::Status(503)),
            ..Default::default()
        });
        let v = validator(transport).with_sink(sink.clone());

        assert_eq!(v.validate_now("admin".into()).await, AsyncOutcome::Valid);
        assert!(matches!(sink.entries()[0], Diagnostic::AsyncTransportFailure { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_open() {
        let sink = CollectingSink::new();
        let transport = Arc::new(MockTransport {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let v = validator(transport)
            .with_timeout(Some(Duration::from_secs(10)))
            .with_sink(sink.clone());

        assert_eq!(v.validate_now("admin".into()).await, AsyncOutcome::Valid);
        assert_eq!(
            sink.entries(),
            vec![Diagnostic::AsyncTimeout {
                url: "https://api.example.com/username".to_string(),
                timeout_ms: 10_000
            }]
        );
    }

    #[tokio::test]
    async fn test_server_message_passed_through() {
        let transport = Arc::new(MockTransport::default());
        let v = validator(transport);

        let outcome = v.validate_now("admin".into()).await;
        assert_eq!(outcome.error(), Some("Username is taken"));
        assert_eq!(v.validate_now("ada".into()).await, AsyncOutcome::Valid);
    }

    #[test]
    fn test_response_wire_shape() {
        let response: AsyncValidationResponse =
            serde_json::from_str(r#"{"valid": false, "message": "Nope"}"#).unwrap();
        assert_eq!(response, AsyncValidationResponse::invalid("Nope"));
        let response: AsyncValidationResponse = serde_json::from_str(r#"{"valid": true}"#).unwrap();
        assert!(response.valid);
    }
}
