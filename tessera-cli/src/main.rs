//! `tessera` entry point.

mod cli;
mod telemetry;

use clap::Parser;
use cli::{Cli, Command, TargetArgs};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tessera_core::{BuildManifest, BuildTarget, ConfigError, HarnessConfig, TesseraResult};
use tessera_harness::{compile_target, write_artifact, Orchestrator, RunContext};
use tessera_ledger::HttpLedgerClient;
use tokio::sync::watch;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init_tracing() {
        eprintln!("warning: logging disabled: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> TesseraResult<()> {
    let source_root = resolve_source(&cli.source)?;
    let manifest = BuildManifest::load(&source_root)?;

    match &cli.command {
        Command::Compile { target, output } => {
            let target = target.resolve(&manifest)?;
            let artifacts = compile_target(&source_root, &target)?;
            let digest = write_artifact(output, &artifacts)?;
            println!("{}  {}", digest, output.display());
        }
        Command::Deploy { target, database } => {
            let orchestrator = connect(&cli, &source_root, target, &manifest)?;
            let report = orchestrator.deploy(database).await?;
            println!("deployed '{}' to {}", report.stage, report.database);
        }
        Command::Test { target } => {
            let orchestrator = connect(&cli, &source_root, target, &manifest)?;
            let report = orchestrator.test().await?;
            for stage in &report.stages {
                println!(
                    "ok  {}  {} scenarios  ({})",
                    stage.stage,
                    stage.scenarios.len(),
                    stage.database
                );
            }
            println!(
                "{} stages, {} scenarios passed",
                report.stages.len(),
                report.scenario_count()
            );
        }
        Command::Targets => {
            for name in manifest.target_names() {
                let target = manifest.target(name)?;
                println!("{}: {}", name, target.stages.join(" -> "));
            }
        }
    }
    Ok(())
}

fn resolve_source(source: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::canonicalize(source).map_err(|e| ConfigError::Io {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Build an orchestrator against the configured ledger. Ctrl-C cancels any
/// wait in progress.
fn connect(
    cli: &Cli,
    source_root: &Path,
    target: &TargetArgs,
    manifest: &BuildManifest,
) -> TesseraResult<Orchestrator<HttpLedgerClient>> {
    let config = HarnessConfig::load(cli.config.as_deref())?;
    let target: BuildTarget = target.resolve(manifest)?;
    let client = HttpLedgerClient::from_settings(&config.ledger)?;
    tracing::info!(endpoint = %client.base_url(), network = %config.ledger.network, "Using ledger");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            let _ = shutdown_tx.send(true);
        }
    });

    let ctx = RunContext::from_config(&config, source_root, target, client, shutdown_rx);
    Ok(Orchestrator::new(ctx))
}
