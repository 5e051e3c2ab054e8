// Shared helpers for real-process tests
#![allow(dead_code)]

use lifeguard_core::domain::{ActionSpec, Parameters};
use std::path::Path;
use std::time::Duration;

/// Action running `script` through `sh -c`
pub fn sh(name: &str, script: &str) -> ActionSpec {
    ActionSpec::exec(name, vec!["sh".into(), "-c".into(), script.into()])
}

pub fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Poll `check` every 50ms until it holds or `limit` elapses
pub async fn eventually<F: FnMut() -> bool>(limit: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

/// Pid written by a test script
pub fn read_pid(path: &Path) -> i32 {
    std::fs::read_to_string(path)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid")
}

/// True while `pid` exists and is not a zombie
pub fn is_running(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if kill(Pid::from_raw(pid), None).is_err() {
        return false;
    }
    // Orphans may linger as zombies until their new parent reaps them
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .map(|(_, rest)| !rest.starts_with('Z'))
            .unwrap_or(true),
        Err(_) => false,
    }
}
