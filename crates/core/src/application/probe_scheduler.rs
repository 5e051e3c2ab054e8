//! Probe Scheduler - one independent timer task per configured probe
//!
//! Each task owns its probe's `ProbeState`; nothing else mutates it. The
//! latest snapshot is published through a `watch` channel so status queries
//! never contend with the task. A tick that arrives while the previous run
//! is still active is skipped, never queued.

use crate::application::registry::ResolvedProbe;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{Parameters, ProbeOutcome, ProbeState, ReportKind};
use crate::port::{CommandExecutor, ExecOptions, ProbeReportSink, TimeProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Read-only view of every probe's latest state
#[derive(Clone, Default)]
pub struct ProbeStatusBoard {
    states: HashMap<String, watch::Receiver<ProbeState>>,
}

impl ProbeStatusBoard {
    /// Latest snapshot of a probe
    pub fn status(&self, probe: &str) -> Option<ProbeState> {
        self.states.get(probe).map(|rx| rx.borrow().clone())
    }

    /// Receiver notified on every state publication
    pub fn subscribe(&self, probe: &str) -> Option<watch::Receiver<ProbeState>> {
        self.states.get(probe).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.states.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Handles of the spawned probe tasks
pub struct RunningProbes {
    board: ProbeStatusBoard,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningProbes {
    pub fn board(&self) -> ProbeStatusBoard {
        self.board.clone()
    }

    /// Wait for every probe task to stop (after shutdown was signalled)
    pub async fn join(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Probe task ended abnormally");
            }
        }
    }
}

/// Spawns and wires probe tasks
pub struct ProbeScheduler {
    executor: Arc<dyn CommandExecutor>,
    sink: Arc<dyn ProbeReportSink>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProbeScheduler {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        sink: Arc<dyn ProbeReportSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            executor,
            sink,
            time_provider,
        }
    }

    /// Start one task per probe. Tasks stop when `shutdown` fires,
    /// after letting an in-flight run complete.
    pub fn spawn(&self, probes: &[ResolvedProbe], shutdown: ShutdownToken) -> RunningProbes {
        let mut states = HashMap::with_capacity(probes.len());
        let mut tasks = Vec::with_capacity(probes.len());

        for probe in probes {
            let state = ProbeState::new(probe.spec.name.clone());
            let (publish, rx) = watch::channel(state.clone());
            states.insert(probe.spec.name.clone(), rx);

            let task = ProbeTask {
                probe: probe.clone(),
                executor: Arc::clone(&self.executor),
                sink: Arc::clone(&self.sink),
                time_provider: Arc::clone(&self.time_provider),
                state,
                publish,
            };
            tasks.push(tokio::spawn(task.run(shutdown.clone())));
        }

        info!(probes = tasks.len(), "Probe scheduler started");
        RunningProbes {
            board: ProbeStatusBoard { states },
            tasks,
        }
    }
}

struct ProbeTask {
    probe: ResolvedProbe,
    executor: Arc<dyn CommandExecutor>,
    sink: Arc<dyn ProbeReportSink>,
    time_provider: Arc<dyn TimeProvider>,
    state: ProbeState,
    publish: watch::Sender<ProbeState>,
}

/// Resolve when the in-flight run finishes; pending forever when idle
async fn settle(slot: &mut Option<JoinHandle<ProbeOutcome>>) -> Result<ProbeOutcome, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

impl ProbeTask {
    async fn run(mut self, mut shutdown: ShutdownToken) {
        let spec = &self.probe.spec;
        info!(
            probe = %spec.name,
            action = %spec.action,
            initial_delay_secs = spec.initial_delay_seconds,
            period_secs = spec.period_seconds,
            "Probe started"
        );

        let mut ticker = interval_at(Instant::now() + spec.initial_delay(), spec.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<ProbeOutcome>> = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                joined = settle(&mut in_flight) => {
                    in_flight = None;
                    self.apply(joined).await;
                }
                _ = ticker.tick() => {
                    if in_flight.is_some() {
                        self.state.skipped_ticks += 1;
                        debug!(
                            probe = %self.state.name,
                            skipped_ticks = self.state.skipped_ticks,
                            "Previous run still active, tick skipped"
                        );
                        self.publish.send_replace(self.state.clone());
                        continue;
                    }
                    in_flight = Some(self.launch());
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            debug!(probe = %self.state.name, "Waiting for in-flight run before stopping");
            let joined = handle.await;
            self.apply(joined).await;
        }
        info!(probe = %self.state.name, status = %self.state.status, "Probe stopped");
    }

    /// Start one run of the probe's action. No retry: the next tick is the retry.
    fn launch(&self) -> JoinHandle<ProbeOutcome> {
        let executor = Arc::clone(&self.executor);
        let action = Arc::clone(&self.probe.action);
        tokio::spawn(async move {
            let options = ExecOptions::default().with_timeout(action.timeout());
            match executor.execute(&action, &Parameters::new(), options).await {
                Ok(result) => match result.exit_error {
                    None => ProbeOutcome::Success {
                        output: String::from_utf8_lossy(&result.stdout).into_owned(),
                    },
                    Some(err) => ProbeOutcome::Failure {
                        message: err.to_string(),
                    },
                },
                Err(err) => ProbeOutcome::Failure {
                    message: err.to_string(),
                },
            }
        })
    }

    async fn apply(&mut self, joined: Result<ProbeOutcome, JoinError>) {
        let outcome = joined.unwrap_or_else(|e| ProbeOutcome::Failure {
            message: format!("probe run aborted: {}", e),
        });
        let now = self.time_provider.now_millis();

        if let Some(event) = self.state.record(&self.probe.spec, outcome, now) {
            match event.kind {
                ReportKind::Transition => info!(
                    probe = %event.probe,
                    status = %event.status,
                    message = ?event.message,
                    "Probe status changed"
                ),
                ReportKind::OutputChanged => info!(
                    probe = %event.probe,
                    output = %event.output.trim_end(),
                    "Probe output changed"
                ),
                ReportKind::Heartbeat => debug!(
                    probe = %event.probe,
                    status = %event.status,
                    "Probe heartbeat"
                ),
            }
            self.sink.report(event).await;
        }

        self.publish.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::{ActionSpec, ProbeSpec, ProbeStatus};
    use crate::port::command_executor::mocks::{MockOutcome, ScriptedExecutor};
    use crate::port::report_sink::mocks::RecordingSink;
    use crate::port::report_sink::MockProbeReportSink;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::time_provider::SystemTimeProvider;
    use std::time::Duration;

    fn probe(success: u32, failure: u32) -> ResolvedProbe {
        ResolvedProbe {
            spec: ProbeSpec::new("roleProbe")
                .with_thresholds(success, failure)
                .with_period_seconds(1),
            action: Arc::new(ActionSpec::exec("roleProbe", vec!["true".into()])),
        }
    }

    fn scheduler(
        executor: Arc<ScriptedExecutor>,
        sink: Arc<dyn ProbeReportSink>,
    ) -> ProbeScheduler {
        ProbeScheduler::new(executor, sink, Arc::new(SystemTimeProvider))
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_sequence_follows_thresholds() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            MockOutcome::Fail("down".into()),
            MockOutcome::Succeed("leader".into()),
            MockOutcome::Succeed("leader".into()),
        ]));
        let sink = RecordingSink::new();
        let (tx, token) = shutdown_channel();

        let running = scheduler(executor, Arc::new(sink.clone())).spawn(&[probe(2, 1)], token);
        let mut rx = running.board().subscribe("roleProbe").unwrap();

        let mut seen = vec![];
        for _ in 0..3 {
            rx.changed().await.unwrap();
            seen.push(rx.borrow_and_update().status);
        }
        tx.shutdown();
        running.join().await;

        assert_eq!(
            seen,
            vec![
                ProbeStatus::Unhealthy,
                ProbeStatus::Unhealthy,
                ProbeStatus::Healthy
            ]
        );
        let reported: Vec<_> = sink.events().iter().map(|e| e.status).collect();
        assert_eq!(reported, vec![ProbeStatus::Unhealthy, ProbeStatus::Healthy]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let executor = Arc::new(
            ScriptedExecutor::succeeding("ok").with_delay(Duration::from_millis(2500)),
        );
        let (tx, token) = shutdown_channel();

        let running = scheduler(executor.clone(), Arc::new(RecordingSink::new()))
            .spawn(&[probe(1, 1)], token);
        tokio::time::sleep(Duration::from_millis(4500)).await;

        let state = running.board().status("roleProbe").unwrap();
        assert!(state.skipped_ticks >= 1);
        assert_eq!(executor.max_active(), 1);

        tx.shutdown();
        running.join().await;
        assert_eq!(executor.max_active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_in_flight_run_finish() {
        let executor = Arc::new(
            ScriptedExecutor::succeeding("ok").with_delay(Duration::from_secs(3)),
        );
        let (tx, token) = shutdown_channel();

        let running = scheduler(executor.clone(), Arc::new(RecordingSink::new()))
            .spawn(&[probe(1, 1)], token);
        let board = running.board();
        tokio::time::sleep(Duration::from_millis(500)).await;

        tx.shutdown();
        running.join().await;

        assert_eq!(executor.call_count(), 1);
        assert_eq!(board.status("roleProbe").unwrap().status, ProbeStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_status_reports_once() {
        let executor = Arc::new(ScriptedExecutor::succeeding("leader"));
        let mut sink = MockProbeReportSink::new();
        sink.expect_report()
            .withf(|event| {
                event.kind == ReportKind::Transition && event.status == ProbeStatus::Healthy
            })
            .times(1)
            .return_const(());
        let (tx, token) = shutdown_channel();

        let running = scheduler(executor.clone(), Arc::new(sink)).spawn(&[probe(1, 1)], token);
        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.shutdown();
        running.join().await;

        assert!(executor.call_count() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecided_probe_keeps_heartbeating() {
        let executor = Arc::new(ScriptedExecutor::new(vec![MockOutcome::Fail("down".into())]));
        let sink = RecordingSink::new();
        let clock = Arc::new(ManualTimeProvider::new(0));
        let mut resolved = probe(1, 3);
        resolved.spec = resolved.spec.with_report_period_seconds(5);
        let (tx, token) = shutdown_channel();

        let running = ProbeScheduler::new(executor, Arc::new(sink.clone()), clock.clone())
            .spawn(&[resolved], token);
        let mut rx = running.board().subscribe("roleProbe").unwrap();

        // First run reports, second is within the report period, third is past it
        rx.changed().await.unwrap();
        rx.changed().await.unwrap();
        clock.advance(6_000);
        rx.changed().await.unwrap();
        tx.shutdown();
        running.join().await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.kind == ReportKind::Heartbeat && e.status == ProbeStatus::Unknown));
        assert_eq!(events[1].timestamp_ms, 6_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_run_independently() {
        let slow = Arc::new(
            ScriptedExecutor::succeeding("ok").with_delay(Duration::from_secs(30)),
        );
        let (tx, token) = shutdown_channel();
        let mut other = probe(1, 1);
        other.spec.name = "secondary".to_string();

        let running = scheduler(slow.clone(), Arc::new(RecordingSink::new()))
            .spawn(&[probe(1, 1), other], token);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Both probes launched their first run even though neither finished
        assert_eq!(slow.call_count(), 2);
        assert_eq!(running.board().names(), vec!["roleProbe", "secondary"]);

        tx.shutdown();
        running.join().await;
    }
}
