//! Agent configuration
//!
//! Settings come from `LIFEGUARD_*` environment variables; the action/probe
//! catalog comes from a file or from the two catalog variables.

use anyhow::{Context, Result};
use lifeguard_core::domain::Catalog;
use serde::Deserialize;
use std::collections::HashMap;

const ENV_PREFIX: &str = "LIFEGUARD";

/// Daemon settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    /// "json" or "pretty"
    pub log_format: String,
    /// Catalog document; when unset the catalog env vars are used
    pub catalog_path: Option<String>,
    /// How long in-flight probe runs may take to finish at shutdown
    pub shutdown_grace_secs: u64,
}

impl AgentConfig {
    /// Load from an explicit variable map
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3501)?
            .set_default("log_format", "pretty")?
            .set_default("shutdown_grace_secs", 10)?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(Some(vars.into_iter().collect())),
            )
            .build()
            .context("Failed to read agent settings")?;

        settings
            .try_deserialize()
            .context("Invalid agent settings")
    }
}

/// Decode the startup catalog. Any failure here is fatal for the agent.
pub fn load_catalog(config: &AgentConfig, vars: &HashMap<String, String>) -> Result<Catalog> {
    match &config.catalog_path {
        Some(path) => {
            let path = shellexpand::tilde(path).into_owned();
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read catalog {}", path))?;
            Catalog::from_json(&raw).with_context(|| format!("Malformed catalog {}", path))
        }
        None => Catalog::from_env_map(vars).context("Malformed catalog environment"),
    }
}
