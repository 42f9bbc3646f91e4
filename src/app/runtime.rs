use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, ConfigError};
use crate::download::{DownloadEngine, DownloadStats, HttpClient};
use crate::error_log::ErrorLog;
use crate::url_list::{UrlListError, read_url_list};

/// Lifecycle of one run.
///
/// `Init → LoadingConfig → ValidatingPaths → ReadingUrlList → Dispatching →
/// AwaitingCompletion → Done`. Any setup step may move to `Aborted` instead,
/// in which case no transfer is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    LoadingConfig,
    ValidatingPaths,
    ReadingUrlList,
    Dispatching,
    AwaitingCompletion,
    Done,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::LoadingConfig => "loading-config",
            Self::ValidatingPaths => "validating-paths",
            Self::ReadingUrlList => "reading-url-list",
            Self::Dispatching => "dispatching",
            Self::AwaitingCompletion => "awaiting-completion",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Fatal problems that stop a run before any transfer starts.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The config file is missing, unreadable, malformed or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The URL list is missing or unreadable.
    #[error(transparent)]
    UrlList(#[from] UrlListError),

    /// The save directory could not be created.
    #[error("failed to create save directory {}: {source}", path.display())]
    CreateSaveDir {
        /// Directory that was requested.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The error log could not be opened for appending.
    #[error("failed to open error log {}: {source}", path.display())]
    OpenErrorLog {
        /// Error log path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    /// Per-outcome counters.
    pub stats: DownloadStats,
    /// Number of URLs dispatched.
    pub urls: usize,
    /// Highest number of transfers that ran at the same time.
    pub peak_in_flight: usize,
    /// Where the error log was written.
    pub error_log_path: PathBuf,
    /// True if the cancellation token fired during the run.
    pub cancelled: bool,
}

#[derive(Debug)]
struct PhaseTracker {
    phase: RunPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: RunPhase::Init,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        debug!(from = %self.phase, to = %next, "run phase");
        self.phase = next;
    }

    fn check<T, E>(&mut self, result: Result<T, E>) -> Result<T, SetupError>
    where
        E: Into<SetupError>,
    {
        result.map_err(|e| {
            let error = e.into();
            warn!(phase = %self.phase, error = %error, "run aborted");
            self.advance(RunPhase::Aborted);
            error
        })
    }
}

/// Loads the config file at `config_path` and downloads every listed URL.
///
/// # Errors
///
/// Returns a [`SetupError`] if the run cannot start. Individual download
/// failures are not errors; they are counted in the report and written to
/// the error log.
#[instrument(skip(cancel), fields(config = %config_path.display()))]
pub async fn run(config_path: &Path, cancel: CancellationToken) -> Result<RunReport, SetupError> {
    let mut tracker = PhaseTracker::new();
    tracker.advance(RunPhase::LoadingConfig);
    let config = tracker.check(Config::load(config_path))?;
    execute(tracker, config, cancel).await
}

/// Runs with an already loaded config.
///
/// # Errors
///
/// Same as [`run`], minus config file errors.
pub async fn run_with_config(
    config: Config,
    cancel: CancellationToken,
) -> Result<RunReport, SetupError> {
    let mut tracker = PhaseTracker::new();
    tracker.advance(RunPhase::LoadingConfig);
    execute(tracker, config, cancel).await
}

async fn execute(
    mut tracker: PhaseTracker,
    config: Config,
    cancel: CancellationToken,
) -> Result<RunReport, SetupError> {
    tracker.advance(RunPhase::ValidatingPaths);
    tracker.check(config.validate())?;
    info!(save_path = %config.save_path.display(), "save directory");
    let save_dir = tokio::fs::create_dir_all(&config.save_path)
        .await
        .map_err(|source| SetupError::CreateSaveDir {
            path: config.save_path.clone(),
            source,
        });
    tracker.check(save_dir)?;

    tracker.advance(RunPhase::ReadingUrlList);
    let entries = tracker.check(read_url_list(&config.urls_file_path).await)?;
    info!(
        urls = entries.len(),
        path = %config.urls_file_path.display(),
        "URL list loaded"
    );

    let error_log = ErrorLog::open(&config.error_log_path)
        .await
        .map_err(|source| SetupError::OpenErrorLog {
            path: config.error_log_path.clone(),
            source,
        });
    let error_log = Arc::new(tracker.check(error_log)?);
    let client = HttpClient::new(config.http_timeout()).map_err(SetupError::HttpClient);
    let client = tracker.check(client)?;

    tracker.advance(RunPhase::Dispatching);
    let urls = entries.len();
    let engine = DownloadEngine::new(Arc::new(config));
    let dispatched = engine.dispatch(entries, &client, Arc::clone(&error_log), &cancel);

    tracker.advance(RunPhase::AwaitingCompletion);
    let stats = dispatched.wait().await;

    if let Err(e) = error_log.close().await {
        warn!(error = %e, path = %error_log.path().display(), "failed to flush error log");
    }
    tracker.advance(RunPhase::Done);

    Ok(RunReport {
        stats,
        urls,
        peak_in_flight: engine.limiter().peak(),
        error_log_path: error_log.path().to_path_buf(),
        cancelled: cancel.is_cancelled(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_phase_tracker_moves_to_aborted_on_error() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(RunPhase::ValidatingPaths);
        let result: Result<(), SetupError> = tracker.check(Err(ConfigError::MissingSavePath));
        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::MissingSavePath))
        ));
        assert_eq!(tracker.phase, RunPhase::Aborted);
    }

    #[test]
    fn test_phase_tracker_keeps_phase_on_success() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(RunPhase::ReadingUrlList);
        let value = tracker.check(Ok::<_, UrlListError>(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(tracker.phase, RunPhase::ReadingUrlList);
    }

    #[test]
    fn test_run_phase_display() {
        assert_eq!(RunPhase::AwaitingCompletion.to_string(), "awaiting-completion");
        assert_eq!(RunPhase::Aborted.to_string(), "aborted");
    }

    #[tokio::test]
    async fn test_run_missing_config_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(&temp_dir.path().join("config.json"), CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_run_empty_save_path_aborts_before_creating_anything() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_save_path("");
        config.urls_file_path = temp_dir.path().join("urls.txt");
        config.error_log_path = temp_dir.path().join("errors.log");

        let result = run_with_config(config, CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::MissingSavePath))
        ));
        assert!(!temp_dir.path().join("errors.log").exists());
    }

    #[tokio::test]
    async fn test_run_huge_concurrency_aborts_instead_of_panicking() {
        let temp_dir = TempDir::new().unwrap();
        let urls = temp_dir.path().join("urls.txt");
        std::fs::write(&urls, "bad-url\n").unwrap();
        let mut config = Config::with_save_path(temp_dir.path().join("out"));
        config.urls_file_path = urls;
        config.error_log_path = temp_dir.path().join("errors.log");
        config.max_at_one_time = usize::MAX;

        let result = run_with_config(config, CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::TooLarge {
                field: "MaxAtOneTime",
                ..
            }))
        ));
        assert!(!temp_dir.path().join("errors.log").exists());
    }

    #[tokio::test]
    async fn test_run_missing_url_list_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_save_path(temp_dir.path().join("out"));
        config.urls_file_path = temp_dir.path().join("missing.txt");
        config.error_log_path = temp_dir.path().join("errors.log");

        let result = run_with_config(config, CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SetupError::UrlList(UrlListError::NotFound { .. }))
        ));
        assert!(!temp_dir.path().join("errors.log").exists());
    }

    #[tokio::test]
    async fn test_run_creates_nested_save_dir_for_empty_list() {
        let temp_dir = TempDir::new().unwrap();
        let urls = temp_dir.path().join("urls.txt");
        std::fs::write(&urls, "\n   \n\n").unwrap();
        let mut config = Config::with_save_path(temp_dir.path().join("a").join("b"));
        config.urls_file_path = urls;
        config.error_log_path = temp_dir.path().join("errors.log");

        let report = run_with_config(config, CancellationToken::new()).await.unwrap();
        assert_eq!(report.urls, 0);
        assert_eq!(report.stats.total(), 0);
        assert!(!report.cancelled);
        assert!(temp_dir.path().join("a").join("b").is_dir());
        assert_eq!(std::fs::read_to_string(&report.error_log_path).unwrap(), "");
    }
}
