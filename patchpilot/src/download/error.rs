//! Error types for payload downloads.

use std::io;
use std::path::PathBuf;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while fetching or verifying one payload file.
///
/// None of these abort a download run; each is recorded against the file it
/// happened to and the run moves on.
#[derive(Debug)]
pub enum DownloadError {
    /// The HTTP client could not be constructed.
    ClientSetup(String),

    /// Connection or transfer failure.
    Transport { url: String, reason: String },

    /// The request exceeded its timeout.
    Timeout { url: String, timeout_secs: u64 },

    /// The server answered with a non-success status.
    HttpStatus { url: String, status: u16 },

    /// Downloaded content does not match the published checksum.
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// The published checksum is neither an MD5 nor a SHA-256 hex digest.
    UnsupportedChecksum { filename: String, checksum: String },

    /// Failed to read a local file.
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a local file.
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    CreateDirFailed { path: PathBuf, source: io::Error },
}

impl DownloadError {
    /// Whether this is an integrity failure rather than a transport or I/O one.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::UnsupportedChecksum { .. }
        )
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientSetup(reason) => write!(f, "failed to set up HTTP client: {}", reason),
            Self::Transport { url, reason } => {
                write!(f, "failed to download {}: {}", url, reason)
            }
            Self::Timeout { url, timeout_secs } => {
                write!(f, "request to {} timed out after {}s", url, timeout_secs)
            }
            Self::HttpStatus { url, status } => {
                write!(f, "GET {} failed with status {}", url, status)
            }
            Self::ChecksumMismatch {
                filename,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "checksum mismatch for {}: expected {}, got {}",
                    filename, expected, actual
                )
            }
            Self::UnsupportedChecksum { filename, checksum } => {
                write!(
                    f,
                    "unrecognized checksum format for {}: {}",
                    filename, checksum
                )
            }
            Self::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::CreateDirFailed { path, source } => {
                write!(
                    f,
                    "failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFailed { source, .. } => Some(source),
            Self::WriteFailed { source, .. } => Some(source),
            Self::CreateDirFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
