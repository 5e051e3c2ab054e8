// Startup Catalog - decoded once, then frozen into the Registry

use crate::domain::action::ActionSpec;
use crate::domain::error::{DomainError, Result};
use crate::domain::probe::ProbeSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Env var carrying the JSON array of action descriptors
pub const ACTIONS_ENV: &str = "LIFEGUARD_ACTIONS";

/// Env var carrying the JSON array of probe descriptors
pub const PROBES_ENV: &str = "LIFEGUARD_PROBES";

/// Serialized list of descriptors supplied at process start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
}

impl Catalog {
    /// Decode a catalog document `{"actions": [...], "probes": [...]}`
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DomainError::MalformedCatalog(e.to_string()))
    }

    /// Decode the catalog from environment variables (each a JSON array).
    /// A missing variable means an empty list.
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self> {
        fn decode<T: serde::de::DeserializeOwned>(
            env: &HashMap<String, String>,
            key: &str,
        ) -> Result<Vec<T>> {
            match env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|e| DomainError::MalformedCatalog(format!("{}: {}", key, e))),
                None => Ok(Vec::new()),
            }
        }

        Ok(Self {
            actions: decode(env, ACTIONS_ENV)?,
            probes: decode(env, PROBES_ENV)?,
        })
    }

    /// Render the catalog as the env vars `from_env_map` accepts, so an
    /// orchestrator can embed it in a container definition.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let encode = |value: serde_json::Result<String>| {
            value.map_err(|e| DomainError::MalformedCatalog(e.to_string()))
        };
        let mut vars = vec![(
            ACTIONS_ENV.to_string(),
            encode(serde_json::to_string(&self.actions))?,
        )];
        if !self.probes.is_empty() {
            vars.push((
                PROBES_ENV.to_string(),
                encode(serde_json::to_string(&self.probes))?,
            ));
        }
        Ok(vars)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.probes.is_empty()
    }
}
