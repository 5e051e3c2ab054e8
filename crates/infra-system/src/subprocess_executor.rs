// Subprocess executor implementation
// One OS process per invocation: pipe pumps, deadline, process-group kill
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lifeguard_core::domain::{ActionHandler, ActionSpec, ExecAction, Parameters};
use lifeguard_core::port::{
    CommandExecutor, Completion, ExecHandle, ExecOptions, ExecSenders, ExecutionError,
    StderrCapture, StreamKind,
};

use crate::env::{ambient_env, compose_env};

type Drained = (Vec<u8>, Option<ExecutionError>);

/// Subprocess executor
///
/// Holds no per-invocation state; every call owns its child, its three
/// pump tasks and a supervisor task that reaps the child.
pub struct SubprocessExecutor {
    ambient: Vec<(String, String)>,
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SubprocessExecutor {
    /// Executor filling unset keys from the agent environment at construction time
    pub fn new() -> Self {
        Self::with_ambient_env(ambient_env())
    }

    /// Executor with an explicit ambient environment
    pub fn with_ambient_env(ambient: Vec<(String, String)>) -> Self {
        Self { ambient }
    }

    fn command(
        &self,
        exec: &ExecAction,
        parameters: &Parameters,
        options: &ExecOptions,
    ) -> Result<Command, ExecutionError> {
        let argv = exec.argv();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecutionError::Validation("empty command vector".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout reaches the whole tree
        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(env) = compose_env(parameters, exec, &self.ambient) {
            cmd.env_clear().envs(env);
        }
        Ok(cmd)
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> ExecutionError {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        if matches!(
            err.raw_os_error().map(Errno::from_raw),
            Some(Errno::EMFILE) | Some(Errno::ENFILE)
        ) {
            return ExecutionError::PipesUnavailable(err.to_string());
        }
    }
    ExecutionError::StartFailed(format!("{}: {}", program, err))
}

fn drain<R>(mut pipe: R, stream: StreamKind) -> JoinHandle<Drained>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let err = pipe
            .read_to_end(&mut buf)
            .await
            .err()
            .map(|e| ExecutionError::Io {
                stream,
                message: e.to_string(),
            });
        (buf, err)
    })
}

fn feed(stdin: Option<ChildStdin>, payload: Option<Vec<u8>>) -> JoinHandle<Option<ExecutionError>> {
    tokio::spawn(async move {
        let (mut pipe, payload) = match (stdin, payload) {
            (Some(pipe), Some(payload)) => (pipe, payload),
            _ => return None,
        };
        let written = match pipe.write_all(&payload).await {
            Ok(()) => pipe.shutdown().await,
            Err(e) => Err(e),
        };
        // Dropping the pipe closes the child's stdin
        drop(pipe);
        written.err().map(|e| ExecutionError::Io {
            stream: StreamKind::Stdin,
            message: e.to_string(),
        })
    })
}

fn joined<T>(
    result: Result<T, JoinError>,
    stream: StreamKind,
    stream_errors: &mut Vec<ExecutionError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            stream_errors.push(ExecutionError::Io {
                stream,
                message: format!("pump task failed: {}", e),
            });
            None
        }
    }
}

/// SIGKILL the child's process group, then the child itself
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "Process group already gone");
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Child already exited");
    }
}

struct Pumps {
    stdin: JoinHandle<Option<ExecutionError>>,
    stdout: JoinHandle<Drained>,
    stderr: JoinHandle<Drained>,
}

/// Everything the supervisor needs to finish one run
struct Run {
    action: String,
    child: Child,
    pumps: Pumps,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    capture: StderrCapture,
    started: Instant,
    senders: ExecSenders,
}

impl Run {
    /// Drive the run to completion and deliver exactly once on every channel.
    /// Pumps are always joined before the exit status is read.
    async fn supervise(self) {
        let Run {
            action,
            mut child,
            pumps,
            timeout,
            cancel,
            capture,
            started,
            senders,
        } = self;
        let pid = child.id();

        let expired = async move {
            match timeout {
                Some(t) => sleep_until(started + t).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        let drained = async move { tokio::join!(pumps.stdin, pumps.stdout, pumps.stderr) };
        tokio::pin!(drained);

        let mut interruption = None;
        let early = tokio::select! {
            results = &mut drained => Some(results),
            _ = &mut expired => {
                interruption = timeout.map(ExecutionError::Timeout);
                None
            }
            _ = cancel.cancelled() => {
                interruption = Some(ExecutionError::Cancelled);
                None
            }
        };

        let (results, status) = match early {
            Some(results) => {
                // Pipes closed; the process may still be running
                let status = tokio::select! {
                    status = child.wait() => Some(status),
                    _ = &mut expired => {
                        interruption = timeout.map(ExecutionError::Timeout);
                        None
                    }
                    _ = cancel.cancelled() => {
                        interruption = Some(ExecutionError::Cancelled);
                        None
                    }
                };
                match status {
                    Some(status) => (results, status),
                    None => {
                        warn!(action = %action, pid = ?pid, "Killing process group");
                        terminate(&mut child);
                        (results, child.wait().await)
                    }
                }
            }
            None => {
                warn!(action = %action, pid = ?pid, "Killing process group");
                terminate(&mut child);
                let results = drained.await;
                (results, child.wait().await)
            }
        };

        let (stdin_result, stdout_result, stderr_result) = results;
        let mut stream_errors = Vec::new();
        if let Some(Some(err)) = joined(stdin_result, StreamKind::Stdin, &mut stream_errors) {
            stream_errors.push(err);
        }
        let mut collect = |result: Result<Drained, JoinError>, stream: StreamKind| {
            let (buf, err) = joined(result, stream, &mut stream_errors).unwrap_or_default();
            stream_errors.extend(err);
            buf
        };
        let stdout = collect(stdout_result, StreamKind::Stdout);
        let mut stderr = collect(stderr_result, StreamKind::Stderr);

        let exit_code = status.as_ref().ok().and_then(ExitStatus::code);
        let error = match (interruption, status) {
            (Some(err), _) => Some(err),
            (None, Err(e)) => Some(ExecutionError::Internal(format!(
                "failed to wait for process: {}",
                e
            ))),
            (None, Ok(status)) if status.success() => None,
            (None, Ok(status)) => {
                let (message, separate) = match capture {
                    StderrCapture::IntoError if !stderr.is_empty() => (
                        String::from_utf8_lossy(&std::mem::take(&mut stderr)).into_owned(),
                        String::new(),
                    ),
                    StderrCapture::IntoError => (status.to_string(), String::new()),
                    StderrCapture::Separate => (
                        status.to_string(),
                        String::from_utf8_lossy(&stderr).into_owned(),
                    ),
                };
                Some(ExecutionError::NonZeroExit {
                    code: exit_code,
                    message,
                    stderr: separate,
                })
            }
        };

        let duration = started.elapsed();
        debug!(
            action = %action,
            pid = ?pid,
            exit_code = ?exit_code,
            duration_ms = duration.as_millis() as u64,
            stream_errors = stream_errors.len(),
            "Process finished"
        );

        senders.deliver(
            stdout,
            stderr,
            Completion {
                exit_code,
                error,
                stream_errors,
                duration,
            },
        );
    }
}

#[async_trait]
impl CommandExecutor for SubprocessExecutor {
    async fn execute_non_blocking(
        &self,
        spec: &ActionSpec,
        parameters: &Parameters,
        options: ExecOptions,
    ) -> Result<ExecHandle, ExecutionError> {
        spec.validate()
            .map_err(|e| ExecutionError::Validation(e.to_string()))?;
        let exec = match &spec.handler {
            ActionHandler::Exec(exec) => exec,
        };

        let mut cmd = self.command(exec, parameters, &options)?;
        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(&exec.commands[0], e))?;

        let stdout = child.stdout.take().ok_or_else(|| ExecutionError::PipeFailed {
            stream: StreamKind::Stdout,
            message: "pipe not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ExecutionError::PipeFailed {
            stream: StreamKind::Stderr,
            message: "pipe not captured".to_string(),
        })?;
        let timeout = options.effective_timeout(spec);

        debug!(
            action = %spec.name,
            pid = ?child.id(),
            timeout_ms = ?timeout.map(|t| t.as_millis() as u64),
            "Process spawned"
        );

        let pumps = Pumps {
            stdin: feed(child.stdin.take(), options.stdin),
            stdout: drain(stdout, StreamKind::Stdout),
            stderr: drain(stderr, StreamKind::Stderr),
        };
        let (senders, handle) = ExecHandle::channel();
        let run = Run {
            action: spec.name.clone(),
            child,
            pumps,
            timeout,
            cancel: options.cancel,
            capture: options.stderr,
            started,
            senders,
        };
        tokio::spawn(run.supervise());

        Ok(handle)
    }
}
