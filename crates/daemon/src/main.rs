//! Lifeguard Agent - Main Entry Point
//! Sidecar serving lifecycle actions over JSON-RPC and running health/role probes

mod config;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use lifeguard_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use lifeguard_core::application::{
    shutdown_channel, Dispatcher, ProbeScheduler, Registry, RetryController,
};
use lifeguard_core::port::id_provider::UuidProvider;
use lifeguard_core::port::time_provider::SystemTimeProvider;
use lifeguard_infra_system::{SubprocessExecutor, TracingReportSink};

use crate::config::{load_catalog, AgentConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(log_format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("lifeguard=info"))
        .context("Failed to create env filter")?;

    match log_format {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM where available
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let vars: HashMap<String, String> = std::env::vars().collect();
    let config = AgentConfig::from_env_map(vars.clone())?;

    // 2. Initialize logging
    init_logging(&config.log_format)?;
    info!("Lifeguard agent v{} starting...", VERSION);

    // 3. Decode the catalog; a bad catalog stops the agent before serving
    let catalog = load_catalog(&config, &vars)?;
    let registry = Arc::new(Registry::build(catalog).context("Invalid catalog")?);

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let executor = Arc::new(SubprocessExecutor::new());
    let retry = Arc::new(RetryController::new(executor.clone()));
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), retry, id_provider));

    // 5. Start probes
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let scheduler = ProbeScheduler::new(executor, Arc::new(TracingReportSink), time_provider);
    let probes = scheduler.spawn(registry.probes(), shutdown_rx);

    // 6. Start JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.host.clone(),
        port: config.port,
    };
    let handler = Arc::new(RpcHandler::new(dispatcher.clone(), probes.board()));
    let (addr, rpc_handle) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(
        addr = %addr,
        actions = registry.actions().len(),
        probes = registry.probes().len(),
        "Agent ready"
    );

    // 7. Wait for shutdown signal
    shutdown_signal().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop serving, let probe runs finish, then
    //    interrupt whatever invocations are still running
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    shutdown_tx.shutdown();
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if tokio::time::timeout(grace, probes.join()).await.is_err() {
        warn!(grace_secs = config.shutdown_grace_secs, "Probe runs did not finish in time");
    }
    dispatcher.cancel_all();
    rpc_handle.stopped().await;

    info!("Shutdown complete.");

    Ok(())
}
