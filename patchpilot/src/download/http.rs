//! HTTP payload fetching.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;

use super::error::{DownloadError, DownloadResult};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("patchpilot/", env!("CARGO_PKG_VERSION"));

/// Callback receiving `(bytes_downloaded, total_bytes)`; total is 0 if unknown.
pub type ProgressCallback<'a> = &'a dyn Fn(u64, u64);

/// Something that can stream a URL into a local file.
///
/// Implementations only transfer bytes. Checksums, temporary files and retry
/// policy are the download manager's job.
pub trait PayloadFetcher {
    /// Stream `url` into `dest`, creating or truncating it.
    ///
    /// Returns the number of bytes written.
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> DownloadResult<u64>;
}

/// Blocking HTTP fetcher backed by `reqwest`.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default 300 second request timeout.
    pub fn new() -> DownloadResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DownloadError::ClientSetup(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_request_error(&self, url: &str, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DownloadError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl PayloadFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> DownloadResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.map_request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);

        let file = File::create(dest).map_err(|e| DownloadError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            let bytes_read = response.read(&mut buffer).map_err(|e| {
                // reqwest surfaces body timeouts as io::Error wrapping its own error
                if e.kind() == std::io::ErrorKind::TimedOut {
                    DownloadError::Timeout {
                        url: url.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    DownloadError::Transport {
                        url: url.to_string(),
                        reason: format!("read error: {}", e),
                    }
                }
            })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| DownloadError::WriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            downloaded += bytes_read as u64;

            if let Some(cb) = progress {
                cb(downloaded, total_size);
            }
        }

        writer.flush().map_err(|e| DownloadError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        Ok(downloaded)
    }
}
