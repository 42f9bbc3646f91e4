//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bulk_downloader::config::DEFAULT_CONFIG_FILE;

/// Download every URL of a list, a few at a time.
///
/// Settings are read from a JSON config file (`SavePath`, `UrlsFilePath`,
/// `MaxAtOneTime`, `HttpTimeout`, `BufferSize`, `RetryCount`,
/// `RetryDelayMs`, `ErrorLogPath`).
#[derive(Parser, Debug)]
#[command(name = "bulk-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the JSON config file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
