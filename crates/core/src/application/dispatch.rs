// Dispatch - entry point turning an invocation request into a run
//
// Resolves the action, validates the request, then runs it through the
// retry controller either inline or as a background task.

use crate::application::registry::Registry;
use crate::application::retry::RetryController;
use crate::domain::{ActionSpec, InvocationRequest};
use crate::error::{AppError, Result};
use crate::port::{ExecOptions, IdProvider, InvocationResult, StderrCapture};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// Result of accepting an invocation
#[derive(Debug)]
pub enum Dispatched {
    /// Blocking request, finished
    Completed(InvocationResult),
    /// Non-blocking request, still running in the background
    Pending(CompletionHandle),
}

/// Background invocation; resolves once with the final result
#[derive(Debug)]
pub struct CompletionHandle {
    invocation_id: String,
    action: String,
    handle: JoinHandle<Result<InvocationResult>>,
}

impl CompletionHandle {
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the background run
    pub async fn wait(self) -> Result<InvocationResult> {
        self.handle
            .await
            .map_err(|e| AppError::Internal(format!("invocation task failed: {}", e)))?
    }
}

/// Action dispatcher
pub struct Dispatcher {
    registry: Arc<Registry>,
    retry: Arc<RetryController>,
    id_provider: Arc<dyn IdProvider>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        retry: Arc<RetryController>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            registry,
            retry,
            id_provider,
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registered actions, sorted by name
    pub fn actions(&self) -> Vec<Arc<ActionSpec>> {
        self.registry.actions()
    }

    /// Interrupt every invocation still running (used at shutdown)
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Execute the named action
    ///
    /// # Errors
    /// - AppError::NotFound if the action is not registered
    /// - AppError::Validation if a parameter name is unusable as an env var
    /// - AppError::Execution / RetryExhausted for a failed blocking run
    pub async fn invoke(&self, request: InvocationRequest) -> Result<Dispatched> {
        let spec = self
            .registry
            .lookup(&request.action)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("action '{}'", request.action)))?;

        if let Some(key) = request.invalid_parameter() {
            return Err(AppError::Validation(format!(
                "invalid parameter name '{}'",
                key.escape_default()
            )));
        }

        let invocation_id = self.id_provider.generate_id();
        let mut options = ExecOptions::default()
            .with_timeout(request.timeout_override())
            .with_cancel(self.cancel.child_token());
        if let Some(input) = request.input {
            options = options.with_stdin(input);
        }
        if request.separate_stderr {
            options = options.with_stderr(StderrCapture::Separate);
        }

        let span = info_span!("invocation", invocation_id = %invocation_id, action = %spec.name);
        let retry = Arc::clone(&self.retry);
        let parameters = request.parameters;
        let non_blocking = request.non_blocking;
        let run = async move {
            info!(
                non_blocking,
                parameters = parameters.len(),
                timeout_secs = ?options.effective_timeout(&spec).map(|t| t.as_secs()),
                "Invocation started"
            );
            let outcome = retry.attempt(&spec, &parameters, options).await;
            match &outcome {
                Ok(result) => info!(
                    duration_ms = result.duration.as_millis() as u64,
                    stdout_bytes = result.stdout.len(),
                    "Invocation succeeded"
                ),
                Err(e) => warn!(error = %e, "Invocation failed"),
            }
            outcome
        }
        .instrument(span);

        if non_blocking {
            Ok(Dispatched::Pending(CompletionHandle {
                invocation_id,
                action: request.action,
                handle: tokio::spawn(run),
            }))
        } else {
            run.await.map(Dispatched::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Catalog;
    use crate::port::command_executor::mocks::{MockOutcome, ScriptedExecutor};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::ExecutionError;
    use std::time::Duration;

    fn dispatcher(executor: Arc<ScriptedExecutor>, actions: Vec<ActionSpec>) -> Dispatcher {
        let registry = Registry::build(Catalog {
            actions,
            probes: vec![],
        })
        .unwrap();
        Dispatcher::new(
            Arc::new(registry),
            Arc::new(RetryController::new(executor)),
            Arc::new(SequentialIdProvider::default()),
        )
    }

    fn action(name: &str) -> ActionSpec {
        ActionSpec::exec(name, vec!["sh".into(), "-c".into(), "true".into()])
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_found() {
        let executor = Arc::new(ScriptedExecutor::succeeding(""));
        let dispatcher = dispatcher(executor.clone(), vec![action("memberJoin")]);

        let result = dispatcher.invoke(InvocationRequest::new("memberLeave")).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_parameter_name_rejected() {
        let executor = Arc::new(ScriptedExecutor::succeeding(""));
        let dispatcher = dispatcher(executor.clone(), vec![action("memberJoin")]);

        let request = InvocationRequest::new("memberJoin").with_parameter("A=B", "x");
        let result = dispatcher.invoke(request).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blocking_invoke_returns_output() {
        let executor = Arc::new(ScriptedExecutor::succeeding("joined"));
        let dispatcher = dispatcher(executor, vec![action("memberJoin")]);

        let dispatched = dispatcher
            .invoke(InvocationRequest::new("memberJoin").with_parameter("POD", "pod-1"))
            .await
            .unwrap();

        match dispatched {
            Dispatched::Completed(result) => assert_eq!(result.stdout_lossy(), "joined"),
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_failure_carries_stderr() {
        let executor = Arc::new(ScriptedExecutor::new(vec![MockOutcome::Fail(
            "no quorum".into(),
        )]));
        let dispatcher = dispatcher(executor, vec![action("memberLeave")]);

        let err = dispatcher
            .invoke(InvocationRequest::new("memberLeave"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "no quorum");
        assert!(matches!(
            err.execution_error(),
            Some(ExecutionError::NonZeroExit { code: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn test_separate_stderr_keeps_exit_message_structured() {
        let executor = Arc::new(ScriptedExecutor::new(vec![MockOutcome::Fail(
            "no quorum".into(),
        )]));
        let dispatcher = dispatcher(executor, vec![action("memberLeave")]);

        let err = dispatcher
            .invoke(InvocationRequest::new("memberLeave").with_separate_stderr())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "exit status: 1");
        match err.execution_error() {
            Some(ExecutionError::NonZeroExit { stderr, .. }) => assert_eq!(stderr, "no quorum"),
            other => panic!("expected non-zero exit, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_returns_immediately() {
        let executor = Arc::new(
            ScriptedExecutor::succeeding("done").with_delay(Duration::from_secs(5)),
        );
        let dispatcher = dispatcher(executor, vec![action("dataDump")]);

        let dispatched = dispatcher
            .invoke(InvocationRequest::new("dataDump").non_blocking())
            .await
            .unwrap();
        let Dispatched::Pending(handle) = dispatched else {
            panic!("expected pending");
        };

        assert_eq!(handle.invocation_id(), "inv-1");
        assert_eq!(handle.action(), "dataDump");
        assert!(!handle.is_finished());
        assert_eq!(handle.wait().await.unwrap().stdout_lossy(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_retries_in_background() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            MockOutcome::Fail("busy".into()),
            MockOutcome::Succeed("ok".into()),
        ]));
        let spec = action("switchover").with_retry_policy(2, 1);
        let dispatcher = dispatcher(executor.clone(), vec![spec]);

        let Dispatched::Pending(handle) = dispatcher
            .invoke(InvocationRequest::new("switchover").non_blocking())
            .await
            .unwrap()
        else {
            panic!("expected pending");
        };

        assert_eq!(handle.wait().await.unwrap().stdout_lossy(), "ok");
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_interrupts_retry_wait() {
        let executor = Arc::new(ScriptedExecutor::new(vec![MockOutcome::Fail(
            "busy".into(),
        )]));
        let spec = action("switchover").with_retry_policy(5, 30);
        let dispatcher = dispatcher(executor.clone(), vec![spec]);

        let Dispatched::Pending(handle) = dispatcher
            .invoke(InvocationRequest::new("switchover").non_blocking())
            .await
            .unwrap()
        else {
            panic!("expected pending");
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        dispatcher.cancel_all();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(
            err.execution_error(),
            Some(ExecutionError::Cancelled)
        ));
        assert_eq!(executor.call_count(), 1);
    }
}
