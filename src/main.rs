//! CLI entry point for the accounting downloader.

use std::process::ExitCode;

use accounting_downloader::{AppConfig, Period, RunSummary, default_config_path, run};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run_downloader(&args).await {
        Ok(summary) => {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                "Done: {} of {} files downloaded",
                summary.completed,
                summary.total()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_downloader(args: &Args) -> Result<RunSummary> {
    let config_path = default_config_path();
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let period = Period::new(args.year, args.month).context("selecting the invoice period")?;

    let summary = run(&config, period)
        .await
        .with_context(|| format!("downloading files for {period}"))?;
    Ok(summary)
}
