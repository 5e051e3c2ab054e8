// Action Domain Model
//
// An action is a named lifecycle hook executed as one local command per invocation.

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Action name (e.g. "memberJoin", "preTerminate")
pub type ActionName = String;

/// Command handler: the executable and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecAction {
    /// First element is the executable, the rest are leading arguments
    pub commands: Vec<String>,
    /// Appended after `commands[1..]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Explicit `KEY=VALUE` overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl ExecAction {
    /// Final argument vector: `commands[0]`, then `commands[1..]`, then `args`
    pub fn argv(&self) -> Vec<String> {
        self.commands
            .iter()
            .chain(self.args.iter())
            .cloned()
            .collect()
    }

    /// `env` entries split into key/value pairs, in declaration order
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }
}

/// Handler kinds an action can carry
///
/// Serialized externally tagged, so a descriptor reads `{"exec": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionHandler {
    Exec(ExecAction),
}

/// Bounded re-attempt rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicySpec {
    /// 0 = exactly one attempt
    #[serde(default)]
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds
    #[serde(default)]
    pub retry_interval: u64,
}

impl RetryPolicySpec {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }
}

/// Action descriptor, immutable once the registry is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub name: ActionName,
    #[serde(flatten)]
    pub handler: ActionHandler,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicySpec>,
}

impl ActionSpec {
    /// Build an exec action with no timeout and no retry policy
    pub fn exec(name: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            name: name.into(),
            handler: ActionHandler::Exec(ExecAction {
                commands,
                ..Default::default()
            }),
            timeout_seconds: None,
            retry_policy: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        let ActionHandler::Exec(exec) = &mut self.handler;
        exec.args = args;
        self
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        let ActionHandler::Exec(exec) = &mut self.handler;
        exec.env = env;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_interval: u64) -> Self {
        self.retry_policy = Some(RetryPolicySpec {
            max_retries,
            retry_interval,
        });
        self
    }

    /// Spec-level timeout; 0/absent = unbounded
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|s| *s > 0)
            .map(|s| Duration::from_secs(u64::from(s)))
    }

    pub fn retry_policy(&self) -> RetryPolicySpec {
        self.retry_policy.unwrap_or_default()
    }

    /// Validate descriptor shape (empty command vector, malformed env)
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| DomainError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("action name must not be empty".to_string()));
        }

        match &self.handler {
            ActionHandler::Exec(exec) => {
                if exec.commands.first().map_or(true, |c| c.is_empty()) {
                    return Err(invalid("empty command vector".to_string()));
                }
                if let Some(bad) = exec.env.iter().find(|e| !e.contains('=')) {
                    return Err(invalid(format!("env entry {:?} is not KEY=VALUE", bad)));
                }
            }
        }
        Ok(())
    }
}
