// Probe scheduling over real processes

mod common;

use common::{eventually, sh};
use lifeguard_core::application::{shutdown_channel, ProbeScheduler, ResolvedProbe};
use lifeguard_core::domain::{ProbeSpec, ProbeStatus, ReportKind};
use lifeguard_core::port::report_sink::mocks::RecordingSink;
use lifeguard_core::port::time_provider::SystemTimeProvider;
use lifeguard_infra_system::SubprocessExecutor;
use std::sync::Arc;
use std::time::Duration;

fn resolved(script: &str, period: u64) -> ResolvedProbe {
    ResolvedProbe {
        spec: ProbeSpec::new("roleProbe")
            .with_thresholds(1, 1)
            .with_period_seconds(period),
        action: Arc::new(sh("roleProbe", script).with_timeout_seconds(5)),
    }
}

fn scheduler(sink: &RecordingSink) -> ProbeScheduler {
    ProbeScheduler::new(
        Arc::new(SubprocessExecutor::new()),
        Arc::new(sink.clone()),
        Arc::new(SystemTimeProvider),
    )
}

#[tokio::test]
async fn test_role_changes_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let role = dir.path().join("role");
    std::fs::write(&role, "leader").unwrap();
    let sink = RecordingSink::new();
    let (shutdown, token) = shutdown_channel();

    let running = scheduler(&sink).spawn(
        &[resolved(&format!("cat {}", role.display()), 1)],
        token,
    );
    let board = running.board();

    assert!(
        eventually(Duration::from_secs(5), || {
            board.status("roleProbe").map(|s| s.status) == Some(ProbeStatus::Healthy)
        })
        .await
    );

    std::fs::write(&role, "follower").unwrap();
    assert!(
        eventually(Duration::from_secs(5), || {
            sink.events()
                .iter()
                .any(|e| e.kind == ReportKind::OutputChanged && e.output == "follower")
        })
        .await
    );

    std::fs::remove_file(&role).unwrap();
    assert!(
        eventually(Duration::from_secs(5), || {
            board.status("roleProbe").map(|s| s.status) == Some(ProbeStatus::Unhealthy)
        })
        .await
    );
    let state = board.status("roleProbe").unwrap();
    assert!(state.last_message.unwrap().contains("No such file"));

    shutdown.shutdown();
    running.join().await;

    let statuses: Vec<_> = sink
        .events()
        .iter()
        .filter(|e| e.kind == ReportKind::Transition)
        .map(|e| e.status)
        .collect();
    assert_eq!(statuses, vec![ProbeStatus::Healthy, ProbeStatus::Unhealthy]);
}

#[tokio::test]
async fn test_slow_probe_never_overlaps() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dir.path().join("lock");
    let log = dir.path().join("log");
    let script = format!(
        "if [ -e {lock} ]; then echo overlap >> {log}; fi; touch {lock}; \
         echo run >> {log}; sleep 1.5; rm -f {lock}",
        lock = lock.display(),
        log = log.display()
    );
    let sink = RecordingSink::new();
    let (shutdown, token) = shutdown_channel();

    let running = scheduler(&sink).spawn(&[resolved(&script, 1)], token);
    let board = running.board();
    tokio::time::sleep(Duration::from_millis(4200)).await;

    shutdown.shutdown();
    running.join().await;

    let log = std::fs::read_to_string(&log).unwrap();
    assert!(!log.contains("overlap"));
    assert!(log.lines().count() >= 2);
    assert!(board.status("roleProbe").unwrap().skipped_ticks >= 1);
    // The in-flight run finished before the task stopped
    assert!(!lock.exists());
}

#[tokio::test]
async fn test_initial_delay_is_honoured() {
    let sink = RecordingSink::new();
    let (shutdown, token) = shutdown_channel();
    let mut probe = resolved("echo up", 1);
    probe.spec.initial_delay_seconds = 2;

    let running = scheduler(&sink).spawn(&[probe], token);
    let board = running.board();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(board.status("roleProbe").unwrap().status, ProbeStatus::Unknown);

    assert!(
        eventually(Duration::from_secs(3), || {
            board.status("roleProbe").map(|s| s.status) == Some(ProbeStatus::Healthy)
        })
        .await
    );

    shutdown.shutdown();
    running.join().await;
}
