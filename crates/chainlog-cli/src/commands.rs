use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chainlog_ledger::{LedgerConfig, LedgerService, ProvisioningService, ValidationReport};
use chainlog_server::{ChainlogServer, ServerConfig};
use chainlog_store::InMemoryStore;
use colored::Colorize;
use serde::Serialize;

use crate::cli::*;
use crate::telemetry;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.command {
        Command::Serve(args) => load_config(args.config.as_deref())?,
        Command::Config(args) => load_config(args.config.as_deref())?,
        Command::Simulate(_) => ServerConfig::default(),
    };
    let level = if cli.verbose { "debug" } else { config.log.level.as_str() };
    telemetry::init(level);

    match cli.command {
        Command::Serve(args) => cmd_serve(args, config).await,
        Command::Simulate(args) => cmd_simulate(args, config, cli.format).await,
        Command::Config(_) => cmd_config(&config, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

async fn cmd_serve(args: ServeArgs, mut config: ServerConfig) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.provision_on_start |= args.provision;

    tracing::warn!("using the in-memory store; records are lost on exit");
    let server = ChainlogServer::new(config, Arc::new(InMemoryStore::new()));
    server.serve_with_shutdown(shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for ctrl-c; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub writers: u64,
    pub appends_per_writer: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_attempts: u64,
    pub max_attempts_seen: u32,
    pub chain_length: u64,
    pub elapsed_ms: u128,
    pub report: ValidationReport,
}

/// Provision an in-memory ledger and race `writers` tasks against it.
pub async fn simulate(
    writers: u64,
    appends: u64,
    config: LedgerConfig,
) -> anyhow::Result<SimulationSummary> {
    let store = Arc::new(InMemoryStore::new());
    ProvisioningService::new(store.clone())
        .provision()
        .await
        .context("provisioning the simulation ledger")?;
    let ledger = LedgerService::new(store, config);

    let started = Instant::now();
    let mut handles = Vec::new();
    for writer in 0..writers {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            for n in 0..appends {
                outcomes.push(ledger.append(&format!("writer-{writer} message-{n}")).await);
            }
            outcomes
        }));
    }

    let mut succeeded = 0;
    let mut failed = 0;
    let mut total_attempts = 0;
    let mut max_attempts_seen = 0;
    for handle in handles {
        for outcome in handle.await.context("writer task panicked")? {
            match outcome {
                Ok(receipt) => {
                    succeeded += 1;
                    total_attempts += u64::from(receipt.attempts);
                    max_attempts_seen = max_attempts_seen.max(receipt.attempts);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "simulated append failed");
                    failed += 1;
                }
            }
        }
    }
    let elapsed = started.elapsed();

    let report = ledger.verify().await?;
    Ok(SimulationSummary {
        writers,
        appends_per_writer: appends,
        succeeded,
        failed,
        total_attempts,
        max_attempts_seen,
        chain_length: report.record_count,
        elapsed_ms: elapsed.as_millis(),
        report,
    })
}

async fn cmd_simulate(
    args: SimulateArgs,
    config: ServerConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut ledger_config = config.ledger_config();
    if let Some(max_attempts) = args.max_attempts {
        ledger_config.retry.max_attempts = max_attempts;
    }

    let summary = simulate(args.writers, args.appends, ledger_config).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print_summary(&summary),
    }

    if !summary.report.is_valid() {
        anyhow::bail!(
            "chain failed validation with {} violation(s)",
            summary.report.violations.len()
        );
    }
    Ok(())
}

fn print_summary(summary: &SimulationSummary) {
    let requested = summary.writers * summary.appends_per_writer;
    println!(
        "{} writers x {} appends in {:?}",
        summary.writers.to_string().bold(),
        summary.appends_per_writer.to_string().bold(),
        Duration::from_millis(summary.elapsed_ms as u64)
    );
    println!(
        "  Appended: {}/{}",
        summary.succeeded.to_string().green(),
        requested
    );
    if summary.failed > 0 {
        println!("  Failed: {}", summary.failed.to_string().red());
    }
    println!(
        "  Attempts: {} total, {} max per append",
        summary.total_attempts,
        summary.max_attempts_seen.to_string().yellow()
    );
    println!("  Chain length: {}", summary.chain_length.to_string().bold());

    if summary.report.is_valid() {
        println!("{} Chain integrity verified", "✓".green().bold());
    } else {
        println!("{} Chain integrity violated", "✗".red().bold());
        for violation in &summary.report.violations {
            println!(
                "  seq {}: {:?} ({})",
                violation.sequence.to_string().yellow(),
                violation.kind,
                violation.description
            );
        }
    }
}

fn cmd_config(config: &ServerConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
