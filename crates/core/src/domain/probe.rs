// Probe Domain Model
//
// A probe periodically runs an action and derives a health status from
// consecutive outcomes.

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_period_seconds() -> u64 {
    10
}

fn default_success_threshold() -> u32 {
    1
}

fn default_failure_threshold() -> u32 {
    3
}

/// Probe descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    /// Defaults to the action name when omitted
    #[serde(default)]
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub initial_delay_seconds: u64,
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Minimum spacing between unchanged-status reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_period_seconds: Option<u64>,
}

impl ProbeSpec {
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            name: action.clone(),
            action,
            initial_delay_seconds: 0,
            period_seconds: default_period_seconds(),
            success_threshold: default_success_threshold(),
            failure_threshold: default_failure_threshold(),
            report_period_seconds: None,
        }
    }

    pub fn with_thresholds(mut self, success: u32, failure: u32) -> Self {
        self.success_threshold = success;
        self.failure_threshold = failure;
        self
    }

    pub fn with_period_seconds(mut self, period: u64) -> Self {
        self.period_seconds = period;
        self
    }

    pub fn with_report_period_seconds(mut self, period: u64) -> Self {
        self.report_period_seconds = Some(period);
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    pub fn report_period(&self) -> Option<Duration> {
        self.report_period_seconds
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Fill the name from the action and check timing/threshold values
    pub fn normalize(mut self) -> Result<Self> {
        if self.name.is_empty() {
            self.name = self.action.clone();
        }
        let invalid = |reason: &str| DomainError::InvalidDescriptor {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.action.is_empty() {
            return Err(invalid("probe must reference an action"));
        }
        if self.period_seconds == 0 {
            return Err(invalid("periodSeconds must be positive"));
        }
        if self.success_threshold == 0 || self.failure_threshold == 0 {
            return Err(invalid("thresholds must be positive"));
        }
        Ok(self)
    }
}

/// Derived health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Unknown => write!(f, "UNKNOWN"),
            ProbeStatus::Healthy => write!(f, "HEALTHY"),
            ProbeStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

/// Outcome of one probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { output: String },
    Failure { message: String },
}

/// Why an event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    Transition,
    Heartbeat,
    OutputChanged,
}

/// Event delivered to the report sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeEvent {
    pub probe: String,
    pub status: ProbeStatus,
    pub kind: ReportKind,
    pub output: String,
    pub message: Option<String>,
    pub timestamp_ms: i64,
}

/// Per-probe state, owned by that probe's scheduler task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeState {
    pub name: String,
    pub status: ProbeStatus,
    pub consecutive_success: u32,
    pub consecutive_failure: u32,
    pub last_transition: Option<i64>, // epoch ms
    pub last_report: Option<i64>,     // epoch ms
    pub last_output: String,
    pub last_message: Option<String>,
    pub skipped_ticks: u64,
}

impl ProbeState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProbeStatus::Unknown,
            consecutive_success: 0,
            consecutive_failure: 0,
            last_transition: None,
            last_report: None,
            last_output: String::new(),
            last_message: None,
            skipped_ticks: 0,
        }
    }

    /// Apply one run outcome and return the event to report, if any.
    ///
    /// Counters are mutually exclusive: a success zeroes the failure counter
    /// and vice versa. A status flip always reports; otherwise a heartbeat is
    /// due once `report_period` has elapsed since the last report.
    pub fn record(
        &mut self,
        spec: &ProbeSpec,
        outcome: ProbeOutcome,
        now_ms: i64,
    ) -> Option<ProbeEvent> {
        let previous = self.status;
        let output_changed;

        match outcome {
            ProbeOutcome::Success { output } => {
                self.consecutive_success = self.consecutive_success.saturating_add(1);
                self.consecutive_failure = 0;
                self.last_message = None;
                output_changed = output != self.last_output;
                self.last_output = output;
                if self.consecutive_success >= spec.success_threshold {
                    self.status = ProbeStatus::Healthy;
                }
            }
            ProbeOutcome::Failure { message } => {
                self.consecutive_failure = self.consecutive_failure.saturating_add(1);
                self.consecutive_success = 0;
                self.last_message = Some(message);
                output_changed = false;
                if self.consecutive_failure >= spec.failure_threshold {
                    self.status = ProbeStatus::Unhealthy;
                }
            }
        }

        let kind = if self.status != previous {
            self.last_transition = Some(now_ms);
            Some(ReportKind::Transition)
        } else if self.status == ProbeStatus::Healthy && output_changed {
            Some(ReportKind::OutputChanged)
        } else if self.heartbeat_due(spec, now_ms) {
            Some(ReportKind::Heartbeat)
        } else {
            None
        }?;

        self.last_report = Some(now_ms);
        Some(ProbeEvent {
            probe: self.name.clone(),
            status: self.status,
            kind,
            output: self.last_output.clone(),
            message: self.last_message.clone(),
            timestamp_ms: now_ms,
        })
    }

    fn heartbeat_due(&self, spec: &ProbeSpec, now_ms: i64) -> bool {
        let Some(period) = spec.report_period() else {
            return false;
        };
        match self.last_report {
            Some(last) => now_ms - last >= period.as_millis() as i64,
            None => true,
        }
    }
}
