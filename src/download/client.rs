//! HTTP client wrapper for downloading files.
//!
//! This module provides the `HttpClient` struct which issues a GET per
//! attempt and streams the body straight into the destination file.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for downloading files with streaming support.
///
/// Built once per run and cloned into every transfer task; clones share the
/// same connection pool. Timeout and User-Agent are fixed at construction.
///
/// # Example
///
/// ```no_run
/// use bulk_downloader::download::HttpClient;
/// use std::path::Path;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(Duration::from_secs(2))?;
/// let cancel = CancellationToken::new();
/// let bytes = client
///     .download_to_path("https://example.com/file.pdf", Path::new("./file.pdf"), 8192, &cancel)
///     .await?;
/// println!("Downloaded {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Creates a client whose requests give up after `timeout`.
    ///
    /// The timeout bounds connecting and receiving the response headers, and
    /// separately each read of the body, so large files are not cut off while
    /// data keeps arriving.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built (for example
    /// when no TLS backend can be initialized).
    #[instrument(level = "debug")]
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Downloads `url` into `file_path`, replacing any existing file.
    ///
    /// The file is only created once the server has answered with a 2xx
    /// status, and a partially written file is removed if streaming fails.
    /// `cancel` is checked while waiting for the response and between body
    /// chunks; a cancelled attempt returns [`DownloadError::Cancelled`].
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns a non-2xx status
    /// - Writing to disk fails
    /// - `cancel` fires before the body is complete
    #[instrument(skip(self, cancel), fields(url = %url, path = %file_path.display()))]
    pub async fn download_to_path(
        &self,
        url: &str,
        file_path: &Path,
        buffer_size: usize,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            response = self.send_get(url) => response?,
        };

        let file = File::create(file_path)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        let stream_result =
            stream_to_file(file, response, url, file_path, buffer_size, cancel).await;
        if stream_result.is_err() {
            debug!("cleaning up partial file after error");
            let _ = tokio::fs::remove_file(file_path).await;
        }
        stream_result
    }

    /// Sends a GET request and returns the response once its headers arrive.
    async fn send_get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = tokio::time::timeout(self.timeout, self.client.get(parsed).send())
            .await
            .map_err(|_| DownloadError::timeout(url))?
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        debug!(status = status.as_u16(), "response headers received");
        Ok(response)
    }
}

/// Streams the response body to the file, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(buffer_size, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else {
            break;
        };
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
