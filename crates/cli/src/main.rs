//! Lifeguard CLI - Command-line interface for the Lifeguard agent

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use lifeguard_core::domain::Catalog;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:3501";
const IN_PROGRESS: i32 = 4009;

#[derive(Parser)]
#[command(name = "lifeguard")]
#[command(about = "Lifeguard sidecar agent CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "LIFEGUARD_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke an action
    Invoke {
        /// Action name (e.g., memberJoin, preTerminate)
        action: String,

        /// Parameter passed to the action environment, KEY=VALUE
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Timeout override in seconds (0 = action default)
        #[arg(short, long)]
        timeout: Option<u32>,

        /// Start in the background; repeat the call to collect the result
        #[arg(long)]
        non_blocking: bool,

        /// Payload written to the command's stdin
        #[arg(long)]
        input: Option<String>,

        /// Show stderr and the exit status separately instead of folding stderr into the error
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the state of a probe
    Probe {
        /// Probe name
        name: String,
    },

    /// List registered actions
    Actions,

    /// Print a catalog file as the agent's catalog environment variables
    RenderEnv {
        /// Catalog document {"actions": [...], "probes": [...]}
        #[arg(long)]
        catalog: PathBuf,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error ({}): {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

#[derive(Deserialize, Tabled)]
struct ActionRow {
    name: String,
    #[serde(deserialize_with = "join_command")]
    command: String,
    #[serde(rename = "timeoutSeconds", deserialize_with = "display_timeout")]
    timeout: String,
    #[serde(rename = "maxRetries")]
    retries: u32,
    #[serde(rename = "retryInterval")]
    interval: u64,
}

fn join_command<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Vec::<String>::deserialize(d).map(|argv| argv.join(" "))
}

fn display_timeout<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Option::<u32>::deserialize(d).map(|t| match t {
        Some(secs) => format!("{}s", secs),
        None => "-".to_string(),
    })
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to agent")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        return Err(error.into());
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Invoke {
            action,
            params,
            timeout,
            non_blocking,
            input,
            verbose,
        } => {
            let parameters: serde_json::Map<String, serde_json::Value> =
                params.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let mut request = json!({
                "action": action,
                "parameters": parameters,
                "nonBlocking": non_blocking,
                "separateStderr": verbose,
            });
            if let Some(timeout) = timeout {
                request["timeout"] = json!(timeout);
            }
            if let Some(input) = input {
                request["input"] = json!(input);
            }

            match call_rpc(&cli.rpc_url, "action.invoke.v1", request).await {
                Ok(result) => {
                    print!("{}", result["stdout"].as_str().unwrap_or_default());
                    if verbose {
                        eprint!("{}", result["stderr"].as_str().unwrap_or_default());
                    }
                    eprintln!(
                        "{}",
                        format!("✓ {} finished in {} ms", action, result["durationMs"])
                            .green()
                            .bold()
                    );
                }
                Err(e) => match e.downcast_ref::<JsonRpcError>() {
                    Some(rpc) if rpc.code == IN_PROGRESS => {
                        println!("{}", format!("… {} is in progress", action).yellow().bold());
                        println!("  Run the same command again to collect the result");
                    }
                    Some(rpc) => {
                        eprintln!("{}", format!("✗ {} failed", action).red().bold());
                        if let Some(code) = rpc.data.as_ref().and_then(|d| d.get("exitCode")) {
                            eprintln!("  {} {}", "Exit code:".bold(), code);
                        }
                        if let Some(stderr) = rpc
                            .data
                            .as_ref()
                            .and_then(|d| d.get("stderr"))
                            .and_then(|s| s.as_str())
                        {
                            eprintln!("  {}", "Stderr:".bold());
                            eprint!("{}", stderr);
                        }
                        return Err(e);
                    }
                    None => return Err(e),
                },
            }
        }

        Commands::Probe { name } => {
            let state = call_rpc(&cli.rpc_url, "probe.status.v1", json!({ "probe": name })).await?;

            let status = state["status"].as_str().unwrap_or("UNKNOWN");
            let colored_status = match status {
                "HEALTHY" => status.green(),
                "UNHEALTHY" => status.red(),
                _ => status.yellow(),
            };
            println!("{}", format!("Probe {}", name).cyan().bold());
            println!();
            println!("  {} {}", "Status:".bold(), colored_status);
            println!(
                "  {} {}",
                "Consecutive success:".bold(),
                state["consecutiveSuccess"]
            );
            println!(
                "  {} {}",
                "Consecutive failure:".bold(),
                state["consecutiveFailure"]
            );
            println!("  {} {}", "Last transition:".bold(), state["lastTransition"]);
            println!("  {} {}", "Skipped ticks:".bold(), state["skippedTicks"]);
            if let Some(output) = state["lastOutput"].as_str().filter(|s| !s.is_empty()) {
                println!("  {} {}", "Last output:".bold(), output.trim_end());
            }
            if let Some(message) = state["lastMessage"].as_str() {
                println!("  {} {}", "Last error:".bold(), message.trim_end().red());
            }
        }

        Commands::Actions => {
            let result = call_rpc(&cli.rpc_url, "action.list.v1", json!({})).await?;
            let rows: Vec<ActionRow> = serde_json::from_value(result["actions"].clone())?;

            if rows.is_empty() {
                println!("{}", "No actions registered".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::RenderEnv { catalog } => {
            let raw = std::fs::read_to_string(&catalog)
                .with_context(|| format!("Failed to read {}", catalog.display()))?;
            let catalog = Catalog::from_json(&raw)?;

            for (key, value) in catalog.to_env_vars()? {
                println!("{}={}", key, value);
            }
        }
    }

    Ok(())
}
