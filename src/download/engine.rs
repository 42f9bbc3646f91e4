//! Download engine: bounded fan-out of one task per URL.
//!
//! [`DownloadEngine::run`] spawns a Tokio task for every [`UrlEntry`]. Each
//! task waits for a [`TransferPermit`](super::TransferPermit) from the shared
//! [`ConcurrencyLimiter`], runs [`attempt_download`] and drops the permit on
//! exit. A failed transfer is written to the [`ErrorLog`] and never affects
//! its siblings; the run ends only after every task is terminal.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bulk_downloader::config::Config;
//! use bulk_downloader::download::{DownloadEngine, HttpClient};
//! use bulk_downloader::error_log::ErrorLog;
//! use bulk_downloader::url_list::parse_url_list;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::with_save_path("./downloads"));
//! let engine = DownloadEngine::new(Arc::clone(&config));
//! let client = HttpClient::new(Duration::from_secs(2))?;
//! let error_log = Arc::new(ErrorLog::open(Path::new("errors.log")).await?);
//! let entries = parse_url_list("https://example.com/a.bin\n");
//!
//! let stats = engine
//!     .run(entries, &client, error_log, &CancellationToken::new())
//!     .await;
//! println!("Completed: {}, Failed: {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::executor::{TransferOutcome, attempt_download};
use super::limiter::{AcquireError, ConcurrencyLimiter};
use super::HttpClient;
use crate::config::Config;
use crate::error_log::ErrorLog;
use crate::url_list::UrlEntry;

/// Statistics from a download run.
///
/// Uses atomic counters so concurrent transfer tasks can update it.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    retried: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successfully completed downloads.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of downloads that failed every attempt.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of downloads abandoned on cancellation.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the total number of transfers that reached a terminal outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed() + self.cancelled()
    }

    /// Returns the number of retry attempts made across all transfers.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn add_retried(&self, count: usize) {
        self.retried.fetch_add(count, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            failed: AtomicUsize::new(self.failed()),
            cancelled: AtomicUsize::new(self.cancelled()),
            retried: AtomicUsize::new(self.retried()),
        }
    }

    fn record(&self, outcome: &TransferOutcome) {
        let retries = outcome.attempts().saturating_sub(1) as usize;
        self.add_retried(retries);
        match outcome {
            TransferOutcome::Success { .. } => self.increment_completed(),
            TransferOutcome::Failed { .. } => self.increment_failed(),
            TransferOutcome::Cancelled { .. } => self.increment_cancelled(),
        }
    }
}

/// Runs a batch of transfers under a shared concurrency limit.
///
/// # Concurrency Model
///
/// - Each URL runs in its own Tokio task
/// - A limiter permit is acquired inside the task before the first attempt
/// - Permits are released automatically when the task ends (RAII)
/// - Attempts for one URL are sequential; different URLs are independent
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    limiter: ConcurrencyLimiter,
    config: Arc<Config>,
}

impl DownloadEngine {
    /// Creates an engine whose limiter admits `config.max_at_one_time`
    /// transfers at once.
    #[must_use]
    #[instrument(level = "debug", skip(config), fields(max_at_one_time = config.max_at_one_time))]
    pub fn new(config: Arc<Config>) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_at_one_time);
        debug!(
            retry_count = config.retry_count,
            retry_delay_ms = config.retry_delay_ms,
            "creating download engine"
        );
        Self { limiter, config }
    }

    /// Returns the limiter shared by this engine's transfers.
    #[must_use]
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Downloads every entry and waits for all of them to finish.
    ///
    /// Individual failures do not stop the run: they are counted in the
    /// returned stats and appended to `error_log`. Once `cancel` fires, queued
    /// transfers give up their turn and in-flight ones stop at the next
    /// checkpoint; both are counted as cancelled.
    pub async fn run(
        &self,
        entries: Vec<UrlEntry>,
        client: &HttpClient,
        error_log: Arc<ErrorLog>,
        cancel: &CancellationToken,
    ) -> DownloadStats {
        self.dispatch(entries, client, error_log, cancel).wait().await
    }

    /// Spawns one transfer task per entry and returns without waiting.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(urls = entries.len()))]
    pub fn dispatch(
        &self,
        entries: Vec<UrlEntry>,
        client: &HttpClient,
        error_log: Arc<ErrorLog>,
        cancel: &CancellationToken,
    ) -> DispatchedRun {
        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::with_capacity(entries.len());

        info!(
            max_at_one_time = self.limiter.max_at_one_time(),
            "dispatching downloads"
        );

        for entry in entries {
            let limiter = self.limiter.clone();
            let config = Arc::clone(&self.config);
            let client = client.clone();
            let error_log = Arc::clone(&error_log);
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let outcome = match limiter.acquire(&cancel).await {
                    Ok(_permit) => {
                        attempt_download(&client, &entry.url, entry.row, &config, &cancel).await
                    }
                    Err(AcquireError::Cancelled) => {
                        debug!(row = entry.row, url = %entry.url, "cancelled before start");
                        TransferOutcome::Cancelled { attempts: 0 }
                    }
                };

                if let TransferOutcome::Failed { error, attempts } = &outcome {
                    error!(
                        row = entry.row,
                        url = %entry.url,
                        attempts,
                        error = %error,
                        "download failed after all attempts"
                    );
                    let message = format!(
                        "Failed to download {} after {attempts} attempt(s): {error}",
                        entry.url
                    );
                    // Best-effort: a log write failure must not fail the run
                    if let Err(e) = error_log.record(&message).await {
                        warn!(
                            error = %e,
                            path = %error_log.path().display(),
                            "failed to write error log"
                        );
                    }
                }

                stats.record(&outcome);
            }));
        }

        DispatchedRun {
            handles,
            stats,
            error_log,
            limiter: self.limiter.clone(),
        }
    }
}

/// Transfers spawned by [`DownloadEngine::dispatch`] that have not been
/// awaited yet.
#[derive(Debug)]
pub struct DispatchedRun {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<DownloadStats>,
    error_log: Arc<ErrorLog>,
    limiter: ConcurrencyLimiter,
}

impl DispatchedRun {
    /// Number of spawned transfer tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing was dispatched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits until every transfer has reached a terminal outcome.
    ///
    /// A panicking task is logged and counted as failed.
    #[instrument(skip_all, fields(tasks = self.handles.len()))]
    pub async fn wait(self) -> DownloadStats {
        let Self {
            handles,
            stats,
            error_log,
            limiter,
        } = self;

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
                let message = format!("Download task panicked: {e}");
                if let Err(e) = error_log.record(&message).await {
                    warn!(error = %e, "failed to write error log");
                }
                stats.increment_failed();
            }
        }

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            cancelled = stats.cancelled(),
            retried = stats.retried(),
            peak_in_flight = limiter.peak(),
            "download run complete"
        );

        // Every task has been awaited, so this is the last reference.
        Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::url_list::parse_url_list;

    fn test_config(dir: &std::path::Path, max_at_one_time: usize) -> Arc<Config> {
        let mut config = Config::with_save_path(dir.join("out"));
        config.max_at_one_time = max_at_one_time;
        config.retry_count = 2;
        config.retry_delay_ms = 10;
        std::fs::create_dir_all(&config.save_path).unwrap();
        Arc::new(config)
    }

    async fn open_log(dir: &std::path::Path) -> Arc<ErrorLog> {
        Arc::new(ErrorLog::open(&dir.join("errors.log")).await.unwrap())
    }

    #[test]
    fn test_download_stats_new_is_zeroed() {
        let stats = DownloadStats::new();
        assert_eq!(stats.completed(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.cancelled(), 0);
        assert_eq!(stats.retried(), 0);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_download_stats_record_outcomes() {
        let stats = DownloadStats::new();
        stats.record(&TransferOutcome::Success {
            path: "a".into(),
            bytes: 1,
            attempts: 2,
        });
        stats.record(&TransferOutcome::Failed {
            error: crate::download::DownloadError::timeout("u"),
            attempts: 3,
        });
        stats.record(&TransferOutcome::Cancelled { attempts: 0 });

        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.cancelled(), 1);
        assert_eq!(stats.retried(), 3);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_download_stats_thread_safety() {
        let stats = Arc::new(DownloadStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.increment_completed();
                    stats.increment_failed();
                    stats.add_retried(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.completed(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.retried(), 1000);
    }

    #[test]
    fn test_engine_limiter_follows_config() {
        let temp_dir = TempDir::new().unwrap();
        let engine = DownloadEngine::new(test_config(temp_dir.path(), 4));
        assert_eq!(engine.limiter().max_at_one_time(), 4);
        assert_eq!(engine.limiter().available(), 4);
    }

    #[test]
    fn test_download_stats_snapshot_copies_counts() {
        let stats = DownloadStats::new();
        stats.record(&TransferOutcome::Success {
            path: "a".into(),
            bytes: 1,
            attempts: 3,
        });
        stats.record(&TransferOutcome::Cancelled { attempts: 0 });

        let copy = stats.snapshot();
        stats.increment_failed();

        assert_eq!(copy.completed(), 1);
        assert_eq!(copy.cancelled(), 1);
        assert_eq!(copy.failed(), 0);
        assert_eq!(copy.retried(), 2);
    }

    #[tokio::test]
    async fn test_run_empty_list_returns_zero_stats() {
        let temp_dir = TempDir::new().unwrap();
        let engine = DownloadEngine::new(test_config(temp_dir.path(), 2));
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();

        let stats = engine
            .run(
                Vec::new(),
                &client,
                open_log(temp_dir.path()).await,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_run_failure_is_isolated_and_logged() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/ok.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fine"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&mock_server)
            .await;

        let config = test_config(temp_dir.path(), 2);
        let engine = DownloadEngine::new(Arc::clone(&config));
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();
        let error_log = open_log(temp_dir.path()).await;
        let list = format!(
            "{0}/missing.txt\n{0}/ok.txt\n",
            mock_server.uri()
        );

        let stats = engine
            .run(
                parse_url_list(&list),
                &client,
                Arc::clone(&error_log),
                &CancellationToken::new(),
            )
            .await;
        error_log.close().await.unwrap();

        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.retried(), 1);
        assert_eq!(
            std::fs::read(config.save_path.join("ok.txt")).unwrap(),
            b"fine"
        );

        let log = std::fs::read_to_string(error_log.path()).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" | Error: "));
        assert!(lines[0].contains("missing.txt"));
        assert!(lines[0].contains("404"));
    }

    #[tokio::test]
    async fn test_run_respects_max_at_one_time() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow")
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&mock_server)
            .await;

        let engine = DownloadEngine::new(test_config(temp_dir.path(), 2));
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let list: String = (0..8)
            .map(|i| format!("{}/f{i}.bin\n", mock_server.uri()))
            .collect();

        let stats = engine
            .run(
                parse_url_list(&list),
                &client,
                open_log(temp_dir.path()).await,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(stats.completed(), 8);
        assert!(engine.limiter().peak() <= 2);
        assert_eq!(engine.limiter().in_flight(), 0);
        assert_eq!(engine.limiter().available(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_then_wait_reports_every_task() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x"))
            .mount(&mock_server)
            .await;

        let engine = DownloadEngine::new(test_config(temp_dir.path(), 3));
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();
        let list = format!("{0}/a.bin\n\n   \n{0}/b.bin\n", mock_server.uri());

        let dispatched = engine.dispatch(
            parse_url_list(&list),
            &client,
            open_log(temp_dir.path()).await,
            &CancellationToken::new(),
        );
        assert_eq!(dispatched.len(), 2);
        assert!(!dispatched.is_empty());

        let stats = dispatched.wait().await;
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.total(), 2);
    }

    #[tokio::test]
    async fn test_run_cancelled_token_makes_no_requests() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let engine = DownloadEngine::new(test_config(temp_dir.path(), 2));
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let list: String = (0..5)
            .map(|i| format!("{}/f{i}.bin\n", mock_server.uri()))
            .collect();

        let stats = engine
            .run(
                parse_url_list(&list),
                &client,
                open_log(temp_dir.path()).await,
                &cancel,
            )
            .await;

        assert_eq!(stats.cancelled(), 5);
        assert_eq!(stats.total(), 5);
    }
}
