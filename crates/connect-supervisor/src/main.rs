//! connect-supervisor - Configuration reconciler for a Kafka Connect worker
//!
//! # Usage
//!
//! ```bash
//! # Supervise the worker (default)
//! connect-supervisor -c supervisor.yaml
//!
//! # Validate configuration file
//! connect-supervisor -c supervisor.yaml validate
//!
//! # Run a single reconciliation pass and exit
//! connect-supervisor -c supervisor.yaml reconcile
//!
//! # Print the rendered worker properties
//! connect-supervisor -c supervisor.yaml render
//!
//! # Probe the worker once
//! connect-supervisor -c supervisor.yaml check
//! ```
//!
//! While supervising, SIGHUP queues an extra reconciliation pass.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use connect_supervisor::health::wait_until_healthy;
use connect_supervisor::properties::{worker_properties, WorkerPaths};
use connect_supervisor::secrets::generate_password;
use connect_supervisor::{
    observe, CommandService, Dispatcher, DirSecretStore, InputSources, PluginStore,
    ReconcileTrigger, RestHealthProbe, Supervisor, SupervisorConfig,
};

#[derive(Parser)]
#[command(name = "connect-supervisor")]
#[command(version, about = "Configuration reconciler for a Kafka Connect worker")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "supervisor.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise the worker (default)
    Run,
    /// Validate configuration file
    Validate,
    /// Run a single reconciliation pass and exit
    Reconcile,
    /// Print the rendered worker properties file
    Render,
    /// Probe the worker health endpoint once
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = SupervisorConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Validate => {
            println!("Configuration OK");
            Ok(())
        }
        Commands::Reconcile => reconcile_once(config).await,
        Commands::Render => render(config),
        Commands::Check => check(config).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_supervisor(
    config: &SupervisorConfig,
) -> Result<(Supervisor, connect_supervisor::ReconcileHandle)> {
    let inputs = InputSources {
        secrets: Box::new(DirSecretStore::new(&config.paths.secrets_dir)),
        plugin_resource: config.plugin_resource.clone(),
        options: config.worker.clone(),
        admin_fallback: generate_password(),
    };

    let plugins = PluginStore::open(&config.paths.plugin_dir)?;

    let probe = RestHealthProbe::new(
        &config.advertised_host,
        config.worker.rest_port,
        &config.health,
    )?;

    let dispatcher = Dispatcher::new(
        Arc::new(CommandService::new(config.service.clone())),
        Arc::new(probe),
        WorkerPaths::new(&config.paths),
        config.kafka.bootstrap_servers.clone(),
        config.advertised_host.clone(),
        config.restart.clone(),
        config.health.clone(),
    );

    Ok(Supervisor::new(inputs, plugins, dispatcher, config.reload.clone()))
}

async fn run(config: SupervisorConfig) -> Result<()> {
    let (mut supervisor, handle) = build_supervisor(&config)?;

    info!(
        service = %config.service.name,
        port = config.worker.rest_port,
        "starting supervisor"
    );

    handle.request(ReconcileTrigger::Startup);

    let loop_handle = tokio::spawn(async move { supervisor.run().await });

    #[cfg(unix)]
    {
        let sighup_handle = handle.clone();
        tokio::spawn(async move {
            let Ok(mut hangup) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            else {
                return;
            };
            while hangup.recv().await.is_some() {
                info!("SIGHUP received, queueing reconciliation pass");
                sighup_handle.request(ReconcileTrigger::Requested);
            }
        });
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    // closing the trigger channel ends the reconciliation loop
    drop(handle);
    loop_handle.await.context("supervisor loop panicked")??;

    info!("supervisor stopped");
    Ok(())
}

async fn reconcile_once(config: SupervisorConfig) -> Result<()> {
    let (mut supervisor, _handle) = build_supervisor(&config)?;
    let outcome = supervisor.pass().await?;
    println!("drift:  {}", outcome.changes);
    println!("action: {:?}", outcome.action);
    Ok(())
}

fn render(config: SupervisorConfig) -> Result<()> {
    let inputs = InputSources {
        secrets: Box::new(DirSecretStore::new(&config.paths.secrets_dir)),
        plugin_resource: config.plugin_resource.clone(),
        options: config.worker.clone(),
        admin_fallback: generate_password(),
    };
    let desired = observe(&inputs)?;

    let paths = WorkerPaths::new(&config.paths);
    let properties = worker_properties(
        &desired,
        &config.kafka.bootstrap_servers,
        &config.advertised_host,
        &paths,
    );
    println!("{}", properties.join("\n"));
    Ok(())
}

async fn check(config: SupervisorConfig) -> Result<()> {
    let inputs = InputSources {
        secrets: Box::new(DirSecretStore::new(&config.paths.secrets_dir)),
        plugin_resource: None,
        options: config.worker.clone(),
        admin_fallback: generate_password(),
    };
    let desired = observe(&inputs)?;

    let probe = RestHealthProbe::new(
        &config.advertised_host,
        config.worker.rest_port,
        &config.health,
    )?;
    wait_until_healthy(&probe, &desired, &config.health).await?;
    println!("Worker healthy");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
