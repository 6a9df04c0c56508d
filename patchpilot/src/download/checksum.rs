//! Payload checksum calculation and verification.
//!
//! Catalog checksums are hex digests whose length identifies the algorithm:
//! 32 characters for MD5, 64 for SHA-256. Comparison ignores case because the
//! catalog publishes upper-case digests.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{DownloadError, DownloadResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Infer the algorithm from a published hex digest.
    ///
    /// Returns `None` if the digest is not hex or has an unknown length.
    pub fn detect(digest: &str) -> Option<Self> {
        let digest = digest.trim();
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match digest.len() {
            32 => Some(Self::Md5),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha256 => write!(f, "SHA-256"),
        }
    }
}

/// Calculate the lower-case hex digest of a file.
pub fn calculate_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> DownloadResult<String> {
    let mut file = File::open(path).map_err(|e| DownloadError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut md5_ctx = md5::Context::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| DownloadError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        match algorithm {
            ChecksumAlgorithm::Md5 => md5_ctx.consume(&buffer[..bytes_read]),
            ChecksumAlgorithm::Sha256 => sha256.update(&buffer[..bytes_read]),
        }
    }

    Ok(match algorithm {
        ChecksumAlgorithm::Md5 => hex::encode(md5_ctx.compute().0),
        ChecksumAlgorithm::Sha256 => hex::encode(sha256.finalize()),
    })
}

/// Verify that a file matches a published checksum.
///
/// # Errors
///
/// - [`DownloadError::UnsupportedChecksum`] if the digest length is unknown
/// - [`DownloadError::ChecksumMismatch`] if the content does not match
/// - [`DownloadError::ReadFailed`] if the file cannot be read
pub fn verify_checksum(path: &Path, expected: &str) -> DownloadResult<()> {
    let filename = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let algorithm =
        ChecksumAlgorithm::detect(expected).ok_or_else(|| DownloadError::UnsupportedChecksum {
            filename: filename.clone(),
            checksum: expected.to_string(),
        })?;

    let actual = calculate_file_checksum(path, algorithm)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(DownloadError::ChecksumMismatch {
            filename,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn hello_file(temp: &TempDir) -> std::path::PathBuf {
        let path = temp.path().join("fix.msp");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"hello world").unwrap();
        path
    }

    #[test]
    fn test_detect_algorithm() {
        assert_eq!(ChecksumAlgorithm::detect(HELLO_MD5), Some(ChecksumAlgorithm::Md5));
        assert_eq!(
            ChecksumAlgorithm::detect(HELLO_SHA256),
            Some(ChecksumAlgorithm::Sha256)
        );
        assert_eq!(ChecksumAlgorithm::detect("abc"), None);
        assert_eq!(
            ChecksumAlgorithm::detect("zz63bbbe01eeed093cb22bb8f5acdc3z"),
            None
        );
    }

    #[test]
    fn test_calculate_md5() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);
        assert_eq!(
            calculate_file_checksum(&path, ChecksumAlgorithm::Md5).unwrap(),
            HELLO_MD5
        );
    }

    #[test]
    fn test_calculate_sha256_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        File::create(&path).unwrap();

        assert_eq!(
            calculate_file_checksum(&path, ChecksumAlgorithm::Sha256).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        assert!(verify_checksum(&path, &HELLO_MD5.to_uppercase()).is_ok());
        assert!(verify_checksum(&path, HELLO_SHA256).is_ok());
    }

    #[test]
    fn test_verify_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        let result = verify_checksum(&path, "00000000000000000000000000000000");
        assert!(matches!(result, Err(DownloadError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_verify_unsupported_format() {
        let temp = TempDir::new().unwrap();
        let path = hello_file(&temp);

        let result = verify_checksum(&path, "not-a-digest");
        assert!(matches!(
            result,
            Err(DownloadError::UnsupportedChecksum { .. })
        ));
    }

    #[test]
    fn test_verify_missing_file() {
        let result = verify_checksum(Path::new("/nonexistent/fix.msp"), HELLO_MD5);
        assert!(matches!(result, Err(DownloadError::ReadFailed { .. })));
    }
}
