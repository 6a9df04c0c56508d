//! Discovery warnings.

use std::path::PathBuf;

use thiserror::Error;

/// A non-fatal problem found while scanning the staging directory.
///
/// The affected directory is skipped; the scan carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryWarning {
    /// The staging directory does not exist.
    #[error("staging directory does not exist: {}", .0.display())]
    MissingStagingDir(PathBuf),

    /// A directory could not be listed.
    #[error("cannot list {}: {reason}", path.display())]
    UnreadableDirectory { path: PathBuf, reason: String },

    /// A descriptor exists but could not be read.
    #[error("cannot read descriptor {}: {reason}", path.display())]
    UnreadableDescriptor { path: PathBuf, reason: String },

    /// A descriptor is not valid JSON for a patch entry.
    #[error("malformed descriptor {}: {reason}", path.display())]
    MalformedDescriptor { path: PathBuf, reason: String },
}
