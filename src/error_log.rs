//! Append-only plaintext log of failed downloads.
//!
//! Every failure becomes one line of the form
//! `<local-timestamp> | Error: <message>`. Writers share one [`ErrorLog`]
//! behind an `Arc`; appends go through an async mutex so lines from concurrent
//! tasks never interleave.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Timestamp layout used at the start of every log line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared sink for failure records.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl ErrorLog {
    /// Opens the log for appending, creating the file and its parent
    /// directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the directory or file cannot be created.
    #[instrument(fields(path = %path.display()))]
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        debug!("error log opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one failure line stamped with the current local time.
    ///
    /// The line is flushed before the lock is released.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the write or flush fails.
    pub async fn record(&self, message: &str) -> std::io::Result<()> {
        let line = format_line(&Local::now(), message);
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }

    /// Flushes any buffered output at the end of a run.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the flush fails.
    pub async fn close(&self) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.get_mut().sync_all().await
    }
}

/// Formats one log line, newline included.
///
/// Line breaks inside `message` are replaced by spaces so a record always
/// occupies exactly one line.
#[must_use]
pub fn format_line(timestamp: &DateTime<Local>, message: &str) -> String {
    let message = message.replace(['\r', '\n'], " ");
    format!(
        "{} | Error: {message}\n",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}
