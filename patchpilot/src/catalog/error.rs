//! Error types for catalog loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur while loading the patch catalog.
///
/// All of these are fatal to the download workflow.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog path does not resolve to a file.
    #[error("patch catalog not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The catalog exists but could not be read.
    #[error("failed to read patch catalog {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    /// The catalog could not be parsed into the expected shape.
    #[error("malformed patch catalog {origin}: {reason}")]
    Malformed { origin: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CatalogError::NotFound(PathBuf::from("Patches/patches.json"));
        assert_eq!(
            err.to_string(),
            "patch catalog not found: Patches/patches.json"
        );
    }

    #[test]
    fn test_malformed_display() {
        let err = CatalogError::Malformed {
            origin: "patches.json".to_string(),
            reason: "expected value at line 1 column 1".to_string(),
        };
        assert!(err.to_string().contains("malformed"));
        assert!(err.to_string().contains("line 1 column 1"));
    }
}
