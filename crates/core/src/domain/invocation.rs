// Invocation Request Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Parameters passed to an action, merged into the process environment.
/// Ordered so environment composition is deterministic.
pub type Parameters = BTreeMap<String, String>;

/// One request to execute an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub action: String,
    #[serde(default)]
    pub parameters: Parameters,
    /// Per-call timeout override in seconds; 0/absent falls back to the action
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub non_blocking: bool,
    /// Optional payload fed to the process stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Keep stderr out of the failure message and return it on its own
    #[serde(default)]
    pub separate_stderr: bool,
}

impl InvocationRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    pub fn with_separate_stderr(mut self) -> Self {
        self.separate_stderr = true;
        self
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
            .filter(|s| *s > 0)
            .map(|s| Duration::from_secs(u64::from(s)))
    }

    /// First parameter key that cannot become an environment variable
    pub fn invalid_parameter(&self) -> Option<&str> {
        self.parameters
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
            .map(String::as_str)
    }
}
