//! Remote options for dependent select fields
//!
//! A field with an [`OptionsSource`] gets its options from an endpoint whose
//! URL may embed the current value of another field through a `{value}`
//! placeholder. Unlike async validation, a failed fetch is surfaced as
//! [`OptionsState::Failed`] rather than silently succeeding.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::schema::{FormValues, OptionsSource, SelectOption};
use crate::tasks::TaskSlots;

const PLACEHOLDER: &str = "{value}";

/// Injected network seam for options fetches
pub trait OptionsTransport: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Json, TransportError>>;
}

/// Options of one field
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OptionsState {
    #[default]
    Idle,
    Loading,
    Loaded(Vec<SelectOption>),
    Failed(String),
}

impl OptionsState {
    pub fn options(&self) -> &[SelectOption] {
        match self {
            OptionsState::Loaded(options) => options,
            _ => &[],
        }
    }
}

/// Endpoint for `source` given the current values.
///
/// `None` when the source depends on a field that is currently empty.
pub fn resolve_url(source: &OptionsSource, values: &FormValues) -> Option<String> {
    let Some(dependency) = &source.depends_on else {
        return Some(source.url.clone());
    };
    let value = values.lookup_path(dependency)?;
    if value.is_empty() {
        return None;
    }
    let encoded: String = url::form_urlencoded::byte_serialize(value.display_text().as_bytes()).collect();
    Some(source.url.replace(PLACEHOLDER, &encoded))
}

/// Map a response array into options, skipping records without both keys
pub fn map_records(source: &OptionsSource, response: &Json) -> Result<Vec<SelectOption>, TransportError> {
    let records = response
        .as_array()
        .ok_or_else(|| TransportError::Decode("expected an array of records".to_string()))?;

    Ok(records
        .iter()
        .filter_map(|record| {
            let label = scalar_text(record.get(&source.label_key)?)?;
            let value = scalar_text(record.get(&source.value_key)?)?;
            Some(SelectOption { label, value })
        })
        .collect())
}

fn scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Loads and tracks options per field; one fetch in flight per field
#[derive(Clone)]
pub struct OptionsLoader {
    transport: Arc<dyn OptionsTransport>,
    slots: TaskSlots<String>,
    states: Arc<Mutex<HashMap<String, OptionsState>>>,
}

impl OptionsLoader {
    pub fn new(transport: Arc<dyn OptionsTransport>) -> Self {
        Self {
            transport,
            slots: TaskSlots::new(),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current options state of a field
    pub fn state(&self, field_id: &str) -> OptionsState {
        self.states.lock().get(field_id).cloned().unwrap_or_default()
    }

    /// Fetch options for `field_id`, superseding any fetch in flight for it.
    ///
    /// Returns `None` when this load was itself superseded.
    pub async fn load(
        &self,
        field_id: &str,
        source: &OptionsSource,
        values: &FormValues,
    ) -> Option<OptionsState> {
        let ticket = self.slots.begin(field_id.to_string());

        let Some(url) = resolve_url(source, values) else {
            debug!("Options for {}: dependency empty", field_id);
            let state = OptionsState::Loaded(Vec::new());
            self.set_state(field_id, state.clone());
            self.slots.finish(&ticket);
            return Some(state);
        };

        self.set_state(field_id, OptionsState::Loading);
        let request = self.transport.fetch(&url);
        let result = tokio::select! {
            _ = ticket.token().cancelled() => return None,
            result = request => result,
        };
        if !self.slots.is_current(&ticket) {
            return None;
        }
        self.slots.finish(&ticket);

        let state = match result.and_then(|response| map_records(source, &response)) {
            Ok(options) => {
                debug!("Options for {}: {} loaded from {}", field_id, options.len(), url);
                OptionsState::Loaded(options)
            }
            Err(e) => {
                warn!("Options for {} failed: {}", field_id, e);
                OptionsState::Failed(e.to_string())
            }
        };
        self.set_state(field_id, state.clone());
        Some(state)
    }

    /// Cancel the fetch in flight for a field; its state goes back to `Idle`
    pub fn cancel(&self, field_id: &str) {
        if self.slots.cancel(&field_id.to_string()) {
            self.set_state(field_id, OptionsState::Idle);
        }
    }

    fn set_state(&self, field_id: &str, state: OptionsState) {
        self.states.lock().insert(field_id.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    struct MockTransport {
        urls: Mutex<Vec<String>>,
        response: Result<Json, TransportError>,
        delay: Duration,
    }

    impl MockTransport {
        fn answering(response: Result<Json, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                urls: Mutex::new(Vec::new()),
                response,
                delay: Duration::ZERO,
            })
        }
    }

    impl OptionsTransport for MockTransport {
        fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Json, TransportError>> {
            self.urls.lock().push(url.to_string());
            let response = self.response.clone();
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                response
            })
        }
    }

    fn cities() -> OptionsSource {
        OptionsSource::new("https://api.example.com/cities?country={value}")
            .depending_on("country")
            .with_keys("name", "id")
    }

    #[test]
    fn test_resolve_url() {
        let source = cities();
        let values = FormValues::new().with("country", "New Zealand");
        assert_eq!(
            resolve_url(&source, &values).as_deref(),
            Some("https://api.example.com/cities?country=New+Zealand")
        );
        assert_eq!(resolve_url(&source, &FormValues::new()), None);
        assert_eq!(resolve_url(&source, &FormValues::new().with("country", " ")), None);

        let fixed = OptionsSource::new("https://api.example.com/plans");
        assert_eq!(resolve_url(&fixed, &FormValues::new()).as_deref(), Some("https://api.example.com/plans"));
    }

    #[test]
    fn test_map_records() {
        let response = json!([
            {"name": "Auckland", "id": 1},
            {"name": "Wellington", "id": "wlg"},
            {"name": "Nowhere"},
            {"name": {"nested": true}, "id": 3}
        ]);
        let options = map_records(&cities(), &response).unwrap();
        assert_eq!(
            options,
            vec![SelectOption::new("Auckland", "1"), SelectOption::new("Wellington", "wlg")]
        );
        assert!(matches!(map_records(&cities(), &json!({"items": []})), Err(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn test_load_and_failure_states() {
        let transport = MockTransport::answering(Ok(json!([{"name": "Paris", "id": "par"}])));
        let loader = OptionsLoader::new(transport.clone());
        let values = FormValues::new().with("country", "FR");

        let state = loader.load("city", &cities(), &values).await.unwrap();
        assert_eq!(state.options(), &[SelectOption::new("Paris", "par")]);
        assert_eq!(loader.state("city"), state);
        assert_eq!(*transport.urls.lock(), vec!["https://api.example.com/cities?country=FR"]);

        let failing = OptionsLoader::new(MockTransport::answering(Err(TransportError::Status(500))));
        let state = failing.load("city", &cities(), &values).await.unwrap();
        assert_eq!(state, OptionsState::Failed("Unexpected status: 500".to_string()));
    }

    #[tokio::test]
    async fn test_empty_dependency_skips_fetch() {
        let transport = MockTransport::answering(Ok(json!([])));
        let loader = OptionsLoader::new(transport.clone());

        let state = loader.load("city", &cities(), &FormValues::new()).await.unwrap();
        assert_eq!(state, OptionsState::Loaded(Vec::new()));
        assert!(transport.urls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_load_supersedes() {
        let transport = Arc::new(MockTransport {
            urls: Mutex::new(Vec::new()),
            response: Ok(json!([{"name": "X", "id": "x"}])),
            delay: Duration::from_millis(100),
        });
        let loader = OptionsLoader::new(transport.clone());

        let first = tokio::spawn({
            let loader = loader.clone();
            async move {
                let values = FormValues::new().with("country", "FR");
                loader.load("city", &cities(), &values).await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let values = FormValues::new().with("country", "DE");
        let second = loader.load("city", &cities(), &values).await;

        assert_eq!(first.await.unwrap(), None);
        assert!(matches!(second, Some(OptionsState::Loaded(_))));
        assert_eq!(transport.urls.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_to_idle() {
        let transport = Arc::new(MockTransport {
            urls: Mutex::new(Vec::new()),
            response: Ok(json!([{"name": "X", "id": "x"}])),
            delay: Duration::from_millis(100),
        });
        let loader = OptionsLoader::new(transport);

        let pending = tokio::spawn({
            let loader = loader.clone();
            async move {
                let values = FormValues::new().with("country", "FR");
                loader.load("city", &cities(), &values).await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.state("city"), OptionsState::Loading);

        loader.cancel("city");
        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(loader.state("city"), OptionsState::Idle);

        loader.cancel("city");
        assert_eq!(loader.state("city"), OptionsState::Idle);
    }
}
