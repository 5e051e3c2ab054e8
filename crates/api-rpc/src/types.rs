//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results. Field names are camelCase.

use lifeguard_core::domain::{ActionHandler, ActionSpec, ProbeState, ProbeStatus};
use lifeguard_core::port::InvocationResult;
use serde::{Deserialize, Serialize};

/// action.invoke.v1 - Execute an action
pub use lifeguard_core::domain::InvocationRequest as InvokeRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    /// Set when the result comes from an earlier non-blocking call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stream_errors: Vec<String>,
    pub duration_ms: u64,
}

impl InvokeResponse {
    pub fn from_result(invocation_id: Option<String>, result: InvocationResult) -> Self {
        Self {
            invocation_id,
            stdout: result.stdout_lossy(),
            stderr: result.stderr_lossy(),
            exit_code: result.exit_code,
            exit_error: result.exit_error.map(|e| e.to_string()),
            stream_errors: result.stream_errors.iter().map(ToString::to_string).collect(),
            duration_ms: result.duration.as_millis() as u64,
        }
    }
}

/// action.list.v1 - Describe registered actions
#[derive(Debug, Default, Deserialize)]
pub struct ListActionsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    pub max_retries: u32,
    pub retry_interval: u64,
}

impl From<&ActionSpec> for ActionSummary {
    fn from(spec: &ActionSpec) -> Self {
        let command = match &spec.handler {
            ActionHandler::Exec(exec) => exec.argv(),
        };
        let policy = spec.retry_policy();
        Self {
            name: spec.name.clone(),
            command,
            timeout_seconds: spec.timeout_seconds.filter(|t| *t > 0),
            max_retries: policy.max_retries,
            retry_interval: policy.retry_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListActionsResponse {
    pub actions: Vec<ActionSummary>,
}

/// probe.status.v1 - Latest state of one probe
#[derive(Debug, Deserialize)]
pub struct ProbeStatusRequest {
    pub probe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStatusResponse {
    pub probe: String,
    pub status: ProbeStatus,
    pub last_transition: Option<i64>,
    pub last_report: Option<i64>,
    pub consecutive_success: u32,
    pub consecutive_failure: u32,
    pub last_output: String,
    #[serde(default)]
    pub last_message: Option<String>,
    pub skipped_ticks: u64,
}

impl From<ProbeState> for ProbeStatusResponse {
    fn from(state: ProbeState) -> Self {
        Self {
            probe: state.name,
            status: state.status,
            last_transition: state.last_transition,
            last_report: state.last_report,
            consecutive_success: state.consecutive_success,
            consecutive_failure: state.consecutive_failure,
            last_output: state.last_output,
            last_message: state.last_message,
            skipped_ticks: state.skipped_ticks,
        }
    }
}
