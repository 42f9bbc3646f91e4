//! Bulk Downloader Library
//!
//! Downloads every URL of a newline-delimited list into one directory,
//! running a bounded number of transfers at once, retrying failures after a
//! fixed delay and recording the URLs that never succeeded in an error log.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - JSON settings file with case-insensitive property names
//! - [`url_list`] - URL list parsing
//! - [`download`] - HTTP client, retry loop, concurrency limiter and engine
//! - [`error_log`] - Append-only failure log shared by all transfers
//! - [`app`] - Run lifecycle tying the pieces together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod download;
pub mod error_log;
pub mod url_list;
mod user_agent;

// Re-export commonly used types
pub use app::{RunPhase, RunReport, SetupError, run, run_with_config};
pub use config::{Config, ConfigError};
pub use download::{
    ConcurrencyLimiter, DownloadEngine, DownloadError, DownloadStats, HttpClient, RetryDecision,
    RetryPolicy, TransferOutcome, attempt_download,
};
pub use error_log::ErrorLog;
pub use url_list::{UrlEntry, UrlListError, parse_url_list, read_url_list};
