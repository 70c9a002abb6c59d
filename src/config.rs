//! Engine configuration
//!
//! Plain structs with defaults. Every field is optional when loading from
//! JSON; missing fields keep their default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Autosave configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Quiet period after the last change before saving
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1000,
        }
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Async validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AsyncValidationConfig {
    /// Debounce for rules without their own `debounceMs`
    pub debounce_ms: u64,
    /// Ceiling on a single request; `None` waits forever
    pub request_timeout_ms: Option<u64>,
}

impl Default for AsyncValidationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            request_timeout_ms: Some(10_000),
        }
    }
}

impl AsyncValidationConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Form session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Mark every visible field touched when submitting
    pub touch_all_on_submit: bool,
    /// Recreate `minInstances` instances after a reset
    pub reseed_min_instances_on_reset: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            touch_all_on_submit: true,
            reseed_min_instances_on_reset: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub autosave: AutosaveConfig,
    pub async_validation: AsyncValidationConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_autosave(mut self, autosave: AutosaveConfig) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn with_async_validation(mut self, async_validation: AsyncValidationConfig) -> Self {
        self.async_validation = async_validation;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
