//! CLI entry point for the bulk downloader.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Bulk downloader starting");

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling downloads");
            signal_token.cancel();
        }
    });

    let report = bulk_downloader::run(&args.config, cancel)
        .await
        .with_context(|| format!("Download run aborted (config: {})", args.config.display()))?;

    info!(
        urls = report.urls,
        completed = report.stats.completed(),
        failed = report.stats.failed(),
        cancelled = report.stats.cancelled(),
        retried = report.stats.retried(),
        peak_in_flight = report.peak_in_flight,
        "Download complete"
    );

    if report.stats.failed() > 0 {
        info!(
            path = %report.error_log_path.display(),
            "Failed downloads were written to the error log"
        );
    }
    if report.cancelled {
        warn!(completed = report.stats.completed(), "Interrupted before all downloads finished");
    }

    Ok(())
}
