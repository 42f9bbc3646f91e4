//! Run configuration loaded from a JSON file.
//!
//! Property names are matched case-insensitively, so `SavePath`, `savePath`
//! and `savepath` all set the same field. Unknown properties are ignored and
//! every property except `SavePath` has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Config file looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default URL list path.
pub const DEFAULT_URLS_FILE: &str = "urls.txt";

/// Default error log path.
pub const DEFAULT_ERROR_LOG_FILE: &str = "errors.log";

/// Default maximum number of simultaneous transfers.
pub const DEFAULT_MAX_AT_ONE_TIME: usize = 5;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 2000;

/// Default write buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Largest accepted `MaxAtOneTime`; the limiter's semaphore cannot hold more.
pub const MAX_AT_ONE_TIME_LIMIT: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Largest accepted `BufferSize` in bytes (64 MiB).
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default number of attempts per URL (including the first one).
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default pause between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("config file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The config file exists but could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or has values of the wrong type.
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// `SavePath` is missing or blank.
    #[error("`SavePath` must be set to a non-empty directory path")]
    MissingSavePath,

    /// A setting that must be positive is zero.
    #[error("invalid config value for `{field}`: must be greater than zero")]
    NotPositive {
        /// Config property name.
        field: &'static str,
    },

    /// A setting exceeds its upper bound.
    #[error("invalid config value for `{field}`: must be at most {max}")]
    TooLarge {
        /// Config property name.
        field: &'static str,
        /// Largest accepted value.
        max: usize,
    },
}

/// Shape of the config file after keys have been lowercased.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct FileConfig {
    #[serde(rename = "savepath")]
    save_path: Option<String>,
    #[serde(rename = "urlsfilepath")]
    urls_file_path: String,
    #[serde(rename = "errorlogpath")]
    error_log_path: String,
    #[serde(rename = "maxatonetime")]
    max_at_one_time: usize,
    #[serde(rename = "httptimeout")]
    http_timeout: u64,
    #[serde(rename = "buffersize")]
    buffer_size: usize,
    #[serde(rename = "retrycount")]
    retry_count: u32,
    #[serde(rename = "retrydelayms")]
    retry_delay_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            save_path: None,
            urls_file_path: DEFAULT_URLS_FILE.to_string(),
            error_log_path: DEFAULT_ERROR_LOG_FILE.to_string(),
            max_at_one_time: DEFAULT_MAX_AT_ONE_TIME,
            http_timeout: DEFAULT_HTTP_TIMEOUT_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Immutable settings for one run.
///
/// Built once by [`Config::load`] (or by hand in tests) and then shared
/// read-only behind an `Arc` by every transfer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory downloaded files are written to. Empty until validated.
    pub save_path: PathBuf,
    /// File holding one URL per line.
    pub urls_file_path: PathBuf,
    /// Append-only log of failed downloads.
    pub error_log_path: PathBuf,
    /// Maximum number of transfers running at the same time.
    pub max_at_one_time: usize,
    /// Per-request timeout in milliseconds.
    pub http_timeout_ms: u64,
    /// Capacity of the buffered file writer in bytes.
    pub buffer_size: usize,
    /// Total attempts per URL, not additional retries.
    pub retry_count: u32,
    /// Pause between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        FileConfig::default().into()
    }
}

impl From<FileConfig> for Config {
    fn from(file: FileConfig) -> Self {
        let save_path = file
            .save_path
            .map(|raw| raw.trim().to_string())
            .unwrap_or_default();
        Self {
            save_path: PathBuf::from(save_path),
            urls_file_path: PathBuf::from(file.urls_file_path),
            error_log_path: PathBuf::from(file.error_log_path),
            max_at_one_time: file.max_at_one_time,
            http_timeout_ms: file.http_timeout,
            buffer_size: file.buffer_size,
            retry_count: file.retry_count,
            retry_delay_ms: file.retry_delay_ms,
        }
    }
}

impl Config {
    /// Creates a config with default values and the given save directory.
    #[must_use]
    pub fn with_save_path(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            ..Self::default()
        }
    }

    /// Loads the config from a JSON file.
    ///
    /// `SavePath` is not checked here; call [`Config::validate`] before
    /// starting any transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist,
    /// [`ConfigError::Read`] if it cannot be read and [`ConfigError::Parse`]
    /// if it is not a JSON object with correctly typed values.
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?config, "config loaded");
        Ok(config)
    }

    /// Parses config JSON text, matching property names case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the text is not an object or a known
    /// property has the wrong type (negative numbers included).
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let normalized = match value {
            Value::Object(map) => Value::Object(lowercase_keys(map)),
            other => other,
        };
        let file: FileConfig = serde_json::from_value(normalized)?;
        Ok(file.into())
    }

    /// Checks the settings that must hold before any transfer starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSavePath`] if the save path is empty and
    /// [`ConfigError::NotPositive`] for a zero concurrency limit, timeout or
    /// buffer size. [`ConfigError::TooLarge`] is returned when the concurrency
    /// limit exceeds [`MAX_AT_ONE_TIME_LIMIT`] or the buffer exceeds
    /// [`MAX_BUFFER_SIZE`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.save_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingSavePath);
        }
        if self.max_at_one_time == 0 {
            return Err(ConfigError::NotPositive {
                field: "MaxAtOneTime",
            });
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "HttpTimeout",
            });
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "BufferSize",
            });
        }
        if self.max_at_one_time > MAX_AT_ONE_TIME_LIMIT {
            return Err(ConfigError::TooLarge {
                field: "MaxAtOneTime",
                max: MAX_AT_ONE_TIME_LIMIT,
            });
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::TooLarge {
                field: "BufferSize",
                max: MAX_BUFFER_SIZE,
            });
        }
        if self.retry_count == 0 {
            warn!("`RetryCount` is 0; every URL will be logged as failed without a request");
        }
        Ok(())
    }

    /// Per-request timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Pause between attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn lowercase_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}
