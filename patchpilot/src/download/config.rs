//! Configuration for the download manager.

use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::{PlatformFilter, ProductSelector};

use super::http::DEFAULT_TIMEOUT_SECS;

/// Default staging directory payloads are downloaded into.
pub const DEFAULT_OUTPUT_DIR: &str = "./arcgis_server_11_1_patches";

/// Default pause between file downloads.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Subdirectory of the output directory that holds download summaries.
pub const SUMMARY_SUBDIR: &str = "logs";

/// Configuration for a download run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Root of the staging tree; one subdirectory per patch.
    pub output_dir: PathBuf,

    /// Which product version and families to resolve.
    pub selector: ProductSelector,

    /// Which platform's patches to resolve.
    pub platform: PlatformFilter,

    /// Pause inserted after every file download attempt.
    pub throttle: Duration,

    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            selector: ProductSelector::default(),
            platform: PlatformFilter::Both,
            throttle: DEFAULT_THROTTLE,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl DownloadConfig {
    /// Create a new configuration writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Set the product selector.
    pub fn with_selector(mut self, selector: ProductSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Set the platform filter.
    pub fn with_platform(mut self, platform: PlatformFilter) -> Self {
        self.platform = platform;
        self
    }

    /// Set the pause between file downloads.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Directory download summaries are written to.
    pub fn summary_dir(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_SUBDIR)
    }

    /// Directory for a patch's staging subdirectory name.
    pub fn patch_dir(&self, staging_name: &str) -> PathBuf {
        self.output_dir.join(staging_name)
    }
}
