// Command Executor Port
// Abstraction for running one action as one OS process

use crate::domain::{ActionSpec, Parameters};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Which standard stream an I/O failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdin => write!(f, "stdin"),
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("invalid action: {0}")]
    Validation(String),

    #[error("failed to create {stream} pipe: {message}")]
    PipeFailed { stream: StreamKind, message: String },

    /// Descriptor limits hit while spawning; the failing pipe is not known
    #[error("failed to create pipes: {0}")]
    PipesUnavailable(String),

    #[error("failed to start command: {0}")]
    StartFailed(String),

    #[error("failed to copy {stream}: {message}")]
    Io { stream: StreamKind, message: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command cancelled")]
    Cancelled,

    /// `message` is the captured stderr text unless stderr was requested
    /// separately, in which case the text travels in `stderr` instead
    #[error("{message}")]
    NonZeroExit {
        code: Option<i32>,
        message: String,
        stderr: String,
    },

    #[error("runtime error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Timeout and cancellation end an invocation without further attempts
    pub fn is_interruption(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_) | ExecutionError::Cancelled)
    }

    /// Infrastructure and command failures may be re-attempted
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::PipeFailed { .. }
                | ExecutionError::PipesUnavailable(_)
                | ExecutionError::StartFailed(_)
                | ExecutionError::Io { .. }
                | ExecutionError::NonZeroExit { .. }
                | ExecutionError::Internal(_)
        )
    }
}

/// How stderr is surfaced on non-zero exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrCapture {
    /// Stderr text becomes the error message; no separate stderr bytes
    #[default]
    IntoError,
    /// Structured exit error plus the raw stderr bytes
    Separate,
}

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Call-level timeout, takes precedence over the action's own
    pub timeout: Option<Duration>,
    pub stderr: StderrCapture,
    /// Payload written to stdin before it is closed
    pub stdin: Option<Vec<u8>>,
    pub cancel: CancellationToken,
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stderr(mut self, stderr: StderrCapture) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Effective timeout: call override first, then the action's; zero means unbounded
    pub fn effective_timeout(&self, spec: &ActionSpec) -> Option<Duration> {
        self.timeout
            .filter(|t| !t.is_zero())
            .or_else(|| spec.timeout())
    }
}

/// Terminal report of a process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: Option<i32>,
    pub error: Option<ExecutionError>,
    /// Per-stream copy failures; never fail the call on their own
    pub stream_errors: Vec<ExecutionError>,
    pub duration: Duration,
}

/// Result of one process run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub exit_error: Option<ExecutionError>,
    pub stream_errors: Vec<ExecutionError>,
    pub duration: Duration,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.exit_error.is_none()
    }

    /// Split into success or the terminal error
    pub fn into_outcome(self) -> Result<Self, ExecutionError> {
        match self.exit_error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Handles returned right after spawn. Each channel fires exactly once,
/// when the process has finished and its pipes are drained.
#[derive(Debug)]
pub struct ExecHandle {
    pub stdout: oneshot::Receiver<Vec<u8>>,
    pub stderr: oneshot::Receiver<Vec<u8>>,
    pub completion: oneshot::Receiver<Completion>,
}

/// Sending half of an [`ExecHandle`]; consumed by a single delivery
#[derive(Debug)]
pub struct ExecSenders {
    stdout: oneshot::Sender<Vec<u8>>,
    stderr: oneshot::Sender<Vec<u8>>,
    completion: oneshot::Sender<Completion>,
}

impl ExecSenders {
    /// Deliver the aggregated outputs and the terminal report.
    /// A receiver that was dropped is not an error.
    pub fn deliver(self, stdout: Vec<u8>, stderr: Vec<u8>, completion: Completion) {
        let _ = self.stdout.send(stdout);
        let _ = self.stderr.send(stderr);
        let _ = self.completion.send(completion);
    }
}

impl ExecHandle {
    pub fn channel() -> (ExecSenders, ExecHandle) {
        let (stdout_tx, stdout_rx) = oneshot::channel();
        let (stderr_tx, stderr_rx) = oneshot::channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        (
            ExecSenders {
                stdout: stdout_tx,
                stderr: stderr_tx,
                completion: completion_tx,
            },
            ExecHandle {
                stdout: stdout_rx,
                stderr: stderr_rx,
                completion: completion_rx,
            },
        )
    }

    /// Wait for all three channels and assemble the result
    pub async fn wait(self) -> InvocationResult {
        let stdout = self.stdout.await.unwrap_or_default();
        let stderr = self.stderr.await.unwrap_or_default();
        match self.completion.await {
            Ok(completion) => InvocationResult {
                stdout,
                stderr,
                exit_code: completion.exit_code,
                exit_error: completion.error,
                stream_errors: completion.stream_errors,
                duration: completion.duration,
            },
            Err(_) => InvocationResult {
                stdout,
                stderr,
                exit_error: Some(ExecutionError::Internal(
                    "completion channel closed unexpectedly".to_string(),
                )),
                ..Default::default()
            },
        }
    }
}

/// Command Executor trait
///
/// Implementations:
/// - SubprocessExecutor: spawns a real OS process (infra-system)
/// - mocks::ScriptedExecutor: replays scripted outcomes (tests)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Spawn the action's process and return its handles immediately
    ///
    /// # Errors
    /// - ExecutionError::Validation if the command vector is empty
    /// - ExecutionError::PipeFailed / PipesUnavailable / StartFailed if no process could be started
    async fn execute_non_blocking(
        &self,
        spec: &ActionSpec,
        parameters: &Parameters,
        options: ExecOptions,
    ) -> Result<ExecHandle, ExecutionError>;

    /// Spawn and wait for completion with fully drained pipes.
    /// Process-level failures (exit, timeout) are carried in `exit_error`.
    /// Dropping the returned future cancels the run.
    async fn execute(
        &self,
        spec: &ActionSpec,
        parameters: &Parameters,
        options: ExecOptions,
    ) -> Result<InvocationResult, ExecutionError> {
        let run = options.cancel.child_token();
        let _abandoned = run.clone().drop_guard();
        let options = options.with_cancel(run);
        let handle = self.execute_non_blocking(spec, parameters, options).await?;
        Ok(handle.wait().await)
    }

    /// Blocking run returning stdout, or the error with stderr folded into it
    async fn run(
        &self,
        spec: &ActionSpec,
        parameters: &Parameters,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ExecutionError> {
        let options = ExecOptions::default().with_timeout(timeout);
        let result = self.execute(spec, parameters, options).await?;
        result.into_outcome().map(|r| r.stdout)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted outcome of one mocked run
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        /// Exit 0 with this stdout
        Succeed(String),
        /// Exit 1 with this stderr text
        Fail(String),
        /// Process never starts
        FailToStart(String),
        /// Run is cut off by its deadline
        Timeout,
    }

    /// Executor replaying a script of outcomes, each taking `delay`.
    /// The last outcome repeats once the script is exhausted.
    pub struct ScriptedExecutor {
        script: Mutex<VecDeque<MockOutcome>>,
        last: Mutex<MockOutcome>,
        delay: std::time::Duration,
        calls: AtomicUsize,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl ScriptedExecutor {
        pub fn new(script: Vec<MockOutcome>) -> Self {
            let last = script
                .last()
                .cloned()
                .unwrap_or_else(|| MockOutcome::Succeed(String::new()));
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(last),
                delay: std::time::Duration::ZERO,
                calls: AtomicUsize::new(0),
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn succeeding(stdout: impl Into<String>) -> Self {
            Self::new(vec![MockOutcome::Succeed(stdout.into())])
        }

        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Highest number of runs observed in flight at once
        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        fn next_outcome(&self) -> MockOutcome {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(outcome) => {
                    *self.last.lock().unwrap() = outcome.clone();
                    outcome
                }
                None => self.last.lock().unwrap().clone(),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute_non_blocking(
            &self,
            spec: &ActionSpec,
            _parameters: &Parameters,
            options: ExecOptions,
        ) -> Result<ExecHandle, ExecutionError> {
            spec.validate()
                .map_err(|e| ExecutionError::Validation(e.to_string()))?;
            self.calls.fetch_add(1, Ordering::SeqCst);

            let outcome = self.next_outcome();
            if let MockOutcome::FailToStart(msg) = &outcome {
                return Err(ExecutionError::StartFailed(msg.clone()));
            }

            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            let (senders, handle) = ExecHandle::channel();
            let active = Arc::clone(&self.active);
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                active.fetch_sub(1, Ordering::SeqCst);

                let (stdout, stderr, exit_code, error) = match outcome {
                    MockOutcome::Succeed(out) => (out.into_bytes(), vec![], Some(0), None),
                    MockOutcome::Fail(err) => {
                        let error = match options.stderr {
                            StderrCapture::IntoError => ExecutionError::NonZeroExit {
                                code: Some(1),
                                message: err.clone(),
                                stderr: String::new(),
                            },
                            StderrCapture::Separate => ExecutionError::NonZeroExit {
                                code: Some(1),
                                message: "exit status: 1".to_string(),
                                stderr: err.clone(),
                            },
                        };
                        (vec![], err.into_bytes(), Some(1), Some(error))
                    }
                    MockOutcome::Timeout => (
                        vec![],
                        vec![],
                        None,
                        Some(ExecutionError::Timeout(delay)),
                    ),
                    MockOutcome::FailToStart(msg) => {
                        (vec![], vec![], None, Some(ExecutionError::StartFailed(msg)))
                    }
                };
                senders.deliver(
                    stdout,
                    stderr,
                    Completion {
                        exit_code,
                        error,
                        stream_errors: vec![],
                        duration: delay,
                    },
                );
            });
            Ok(handle)
        }
    }
}
