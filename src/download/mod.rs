//! HTTP transfers with bounded concurrency and retries.
//!
//! This module provides everything between a parsed URL list and files on
//! disk: the shared HTTP client, the per-URL retry loop, the admission gate
//! and the engine that fans work out across Tokio tasks.
//!
//! # Features
//!
//! - Streaming downloads through a buffered writer of configurable size
//! - File names taken from the URL's last path segment, with a unique fallback
//! - Fixed-delay retries for every failure, bounded by an attempt budget
//! - Cooperative cancellation at every suspension point
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use bulk_downloader::download::HttpClient;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(Duration::from_secs(2))?;
//! let bytes = client
//!     .download_to_path(
//!         "https://example.com/paper.pdf",
//!         Path::new("./downloads/paper.pdf"),
//!         8192,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("Downloaded {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod executor;
pub mod filename;
mod limiter;
mod retry;

pub use client::HttpClient;
pub use engine::{DispatchedRun, DownloadEngine, DownloadStats};
pub use error::DownloadError;
pub use executor::{TransferOutcome, attempt_download};
pub use filename::target_filename;
pub use limiter::{AcquireError, ConcurrencyLimiter, TransferPermit};
pub use retry::{RetryDecision, RetryPolicy};
