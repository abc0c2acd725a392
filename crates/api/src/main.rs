//! RelayPost - fan-out content synchronisation
//!
//! Main entry point for the `relaypost` binary.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use relaypost_app::cli::{Cli, Command, TargetCommand};
use relaypost_app::commands;
use relaypost_app::utils::logging::{init_tracing, log_command_execution};
use relaypost_app::AppContext;
use relaypost_core::{OrchestratorError, SyncOutcome, SyncReport};
use relaypost_infra::config;

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so it can feed both clap's env fallbacks and the loader
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json).context("failed to install tracing subscriber")?;

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(error = %err, "could not load .env file"),
    }

    let settings = config::load_with(cli.config.clone()).context("failed to load settings")?;
    let ctx = AppContext::new(settings).context("failed to initialise application")?;

    let name = cli.command.name();
    let started = Instant::now();
    let result = run(&ctx, cli.command).await;
    log_command_execution(name, started.elapsed(), result.is_ok());
    result
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Target { command } => run_target(ctx, command).await,
        Command::Sync { item_id, targets, mode } => {
            print_report(commands::sync_item(ctx, item_id, targets, mode).await)
        }
        Command::Delete { item_id, targets } => {
            print_report(commands::delete_item(ctx, item_id, targets).await)
        }
        Command::RetryFailed { target_id, max_retries } => {
            let retried = commands::retry_failed(ctx, &target_id, max_retries).await?;
            println!(
                "queued {} failed sync(s) of {target_id} for retry, reset {} failed upload(s)",
                retried.queued, retried.media_reset
            );
            Ok(())
        }
        Command::Stats { target } => {
            let stats = commands::sync_stats(ctx, target.as_deref()).await?;
            print!("{}", commands::render_stats(target.as_deref(), &stats));
            Ok(())
        }
        Command::Worker => {
            commands::run_worker(ctx, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "failed to listen for ctrl-c");
                }
            })
            .await?;
            Ok(())
        }
    }
}

async fn run_target(ctx: &AppContext, command: TargetCommand) -> Result<()> {
    match command {
        TargetCommand::Add { name, base_url, username, password } => {
            let target =
                commands::add_target(ctx, &name, &base_url, &username, &password).await?;
            println!("added target {} ({})", target.id, target.base_url);
        }
        TargetCommand::List { all } => {
            let targets = commands::list_targets(ctx, all).await?;
            print!("{}", commands::render_targets(&targets));
        }
        TargetCommand::Deactivate { target_id } => {
            commands::deactivate_target(ctx, &target_id).await?;
            println!("deactivated target {target_id}");
        }
        TargetCommand::Remove { target_id } => {
            commands::remove_target(ctx, &target_id).await?;
            println!("removed target {target_id}");
        }
    }
    Ok(())
}

/// Print the per-target report; a request where every target failed still
/// prints its report before the error is returned.
fn print_report(result: Result<SyncReport, OrchestratorError>) -> Result<()> {
    match result {
        Ok(report) => {
            print!("{}", commands::render_report(&report));
            if report.outcome() == SyncOutcome::PartialSuccess {
                tracing::warn!(item_id = report.item_id, "sync partially failed");
            }
            Ok(())
        }
        Err(OrchestratorError::AllFailed(report)) => {
            print!("{}", commands::render_report(&report));
            anyhow::bail!("all targets failed for item {}", report.item_id)
        }
        Err(err) => Err(err.into()),
    }
}
