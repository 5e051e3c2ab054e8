// Process environment composition

use lifeguard_core::domain::{ExecAction, Parameters};
use std::collections::BTreeMap;

/// Snapshot of the agent's own environment (non UTF-8 entries dropped)
pub fn ambient_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Compose the child environment, lowest precedence first:
/// ambient < parameters < action `env`.
///
/// Returns `None` when neither parameters nor action env are set; the child
/// then inherits the agent environment untouched and `ambient` is not read.
pub fn compose_env(
    parameters: &Parameters,
    exec: &ExecAction,
    ambient: &[(String, String)],
) -> Option<Vec<(String, String)>> {
    let mut env: BTreeMap<String, String> = parameters.clone();
    for (key, value) in exec.env_pairs() {
        env.insert(key.to_string(), value.to_string());
    }
    if env.is_empty() {
        return None;
    }

    for (key, value) in ambient {
        env.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Some(env.into_iter().collect())
}
