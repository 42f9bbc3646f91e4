//! Per-URL transfer: the attempt/retry state machine.
//!
//! One call to [`attempt_download`] owns one URL from the first attempt to a
//! terminal [`TransferOutcome`]. Attempts run strictly one after another:
//!
//! ```text
//! max = 0 ────────────────────────▶ Failed   (no request)
//! Attempting(n) ──ok──────────────▶ Success
//!      │
//!      ├─err, n < max──▶ Retrying(n+1) ──delay──▶ Attempting(n+1)
//!      ├─err, n = max──▶ Failed
//!      └─cancel────────▶ Cancelled   (also from Retrying)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::filename::target_filename;
use super::retry::{RetryDecision, RetryPolicy};
use super::{DownloadError, HttpClient};
use crate::config::Config;

/// Terminal result of one URL's transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The body was written to `path`.
    Success {
        /// Destination file.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
        /// Attempt that succeeded (1-indexed).
        attempts: u32,
    },

    /// Every allowed attempt failed; `error` is the last failure.
    Failed {
        /// Error from the final attempt.
        error: DownloadError,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The run was cancelled before the transfer finished.
    Cancelled {
        /// Number of attempts started before cancellation.
        attempts: u32,
    },
}

impl TransferOutcome {
    /// Number of attempts that were started.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Returns true for [`TransferOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Where a transfer stands between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    /// About to run attempt `n`.
    Attempting(u32),
    /// Attempt `n - 1` failed; wait `delay` before attempt `n`.
    Retrying { attempt: u32, delay: Duration },
}

/// Result of a single attempt.
enum AttemptResult {
    Success(u64),
    RetryableFailure(DownloadError),
    Cancelled,
}

impl From<Result<u64, DownloadError>> for AttemptResult {
    fn from(result: Result<u64, DownloadError>) -> Self {
        match result {
            Ok(bytes) => Self::Success(bytes),
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(e) => Self::RetryableFailure(e),
        }
    }
}

/// Downloads one URL into the save directory, retrying failures.
///
/// The file is named after the URL's last path segment, or
/// `file_{row}_{id}` when there is none. Up to `config.retry_count` attempts
/// are made with `config.retry_delay_ms` between them; the delay is cut short
/// by `cancel`, and no new attempt starts once `cancel` has fired. With a
/// budget of zero the URL fails without a request.
#[instrument(skip(client, config, cancel), fields(url = %url))]
pub async fn attempt_download(
    client: &HttpClient,
    url: &str,
    row: usize,
    config: &Config,
    cancel: &CancellationToken,
) -> TransferOutcome {
    let policy = RetryPolicy::from_config(config);
    if policy.max_attempts() == 0 {
        warn!("attempt budget is zero, skipping download");
        return TransferOutcome::Failed {
            error: DownloadError::no_attempts(url),
            attempts: 0,
        };
    }

    let file_path = config.save_path.join(target_filename(url, row));
    let mut state = TransferState::Attempting(1);

    loop {
        state = match state {
            TransferState::Attempting(attempt) => {
                if cancel.is_cancelled() {
                    debug!(attempt, "cancelled before attempt");
                    return TransferOutcome::Cancelled {
                        attempts: attempt - 1,
                    };
                }

                info!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    path = %file_path.display(),
                    "downloading"
                );
                let result = client
                    .download_to_path(url, &file_path, config.buffer_size, cancel)
                    .await;

                match AttemptResult::from(result) {
                    AttemptResult::Success(bytes) => {
                        info!(attempt, bytes, path = %file_path.display(), "download succeeded");
                        return TransferOutcome::Success {
                            path: file_path,
                            bytes,
                            attempts: attempt,
                        };
                    }
                    AttemptResult::Cancelled => {
                        info!(attempt, "download cancelled");
                        return TransferOutcome::Cancelled { attempts: attempt };
                    }
                    AttemptResult::RetryableFailure(error) => match policy.should_retry(attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            warn!(
                                attempt,
                                max_attempts = policy.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "attempt failed, retrying"
                            );
                            TransferState::Retrying {
                                attempt: next_attempt,
                                delay,
                            }
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(%reason, "not retrying download");
                            return TransferOutcome::Failed {
                                error,
                                attempts: attempt,
                            };
                        }
                    },
                }
            }
            TransferState::Retrying { attempt, delay } => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!(attempt, "cancelled while waiting to retry");
                        return TransferOutcome::Cancelled {
                            attempts: attempt - 1,
                        };
                    }
                    () = tokio::time::sleep(delay) => TransferState::Attempting(attempt),
                }
            }
        };
    }
}
