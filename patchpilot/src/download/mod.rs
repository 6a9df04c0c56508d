//! Payload download pipeline.
//!
//! [`DownloadManager`] turns matched catalog entries into a staging tree the
//! apply side can consume, recording one [`DownloadRecord`] per payload.
//! Transfers go through the [`PayloadFetcher`] trait; [`HttpFetcher`] is the
//! production implementation.

mod checksum;
mod config;
mod error;
mod http;
mod manager;
mod record;

pub use checksum::{calculate_file_checksum, verify_checksum, ChecksumAlgorithm};
pub use config::{DownloadConfig, DEFAULT_OUTPUT_DIR, DEFAULT_THROTTLE, SUMMARY_SUBDIR};
pub use error::{DownloadError, DownloadResult};
pub use http::{HttpFetcher, PayloadFetcher, ProgressCallback, DEFAULT_TIMEOUT_SECS};
pub use manager::{payload_file_name, DownloadManager, DownloadObserver, NoopObserver};
pub use record::{DownloadLedger, DownloadOutcome, DownloadRecord, SkippedUrl};
