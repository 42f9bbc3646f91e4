//! Reading the newline-delimited URL list.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while reading the URL list.
#[derive(Debug, Error)]
pub enum UrlListError {
    /// The URL list file does not exist.
    #[error("URL list not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The URL list exists but could not be read.
    #[error("failed to read URL list {}: {source}", path.display())]
    Read {
        /// Path of the URL list.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// One URL from the list together with its row index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    /// 0-based position among the non-blank lines of the list.
    pub row: usize,
    /// The URL with surrounding whitespace removed.
    pub url: String,
}

/// Splits URL list text into entries, skipping blank lines.
///
/// Blank lines do not consume a row index.
#[must_use]
pub fn parse_url_list(text: &str) -> Vec<UrlEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(row, url)| UrlEntry {
            row,
            url: url.to_string(),
        })
        .collect()
}

/// Reads and parses the URL list file.
///
/// # Errors
///
/// Returns [`UrlListError::NotFound`] if the file is missing and
/// [`UrlListError::Read`] for any other IO failure.
#[instrument(fields(path = %path.display()))]
pub async fn read_url_list(path: &Path) -> Result<Vec<UrlEntry>, UrlListError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            UrlListError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            UrlListError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let entries = parse_url_list(&text);
    debug!(count = entries.len(), "URL list read");
    Ok(entries)
}
