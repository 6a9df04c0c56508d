//! Download outcome records.

use std::fmt;
use std::path::PathBuf;

use crate::staging::PayloadPlatform;

/// What happened to one payload file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Transferred (and verified when a checksum was published).
    Fetched { bytes: u64 },
    /// Already on disk with a matching checksum; nothing transferred.
    AlreadyPresent,
    /// Could not be fetched or failed verification.
    Failed { reason: String },
}

impl DownloadOutcome {
    /// Whether the file is usable at its destination.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetched { bytes } => write!(f, "fetched ({} bytes)", bytes),
            Self::AlreadyPresent => write!(f, "already present"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome of fetching one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub patch_name: String,
    pub file_name: String,
    pub url: String,
    pub destination: PathBuf,
    pub platform: PayloadPlatform,
    pub outcome: DownloadOutcome,
}

impl DownloadRecord {
    /// Whether the payload is usable at its destination.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// A payload URL that was not attempted because no file name could be derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUrl {
    pub patch_name: String,
    pub url: String,
}

/// Everything a download run did, in order.
#[derive(Debug, Clone, Default)]
pub struct DownloadLedger {
    /// Number of catalog entries that matched the filter.
    pub patches_matched: usize,

    /// One record per attempted payload, in attempt order.
    pub records: Vec<DownloadRecord>,

    /// Matched patches that list no payload URLs.
    pub patches_without_files: Vec<String>,

    /// URLs without a usable file name.
    pub skipped_urls: Vec<SkippedUrl>,
}

impl DownloadLedger {
    /// Append a record.
    pub fn push(&mut self, record: DownloadRecord) {
        self.records.push(record);
    }

    /// Records whose payload is usable, in attempt order.
    pub fn succeeded(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|r| r.is_success())
    }

    /// Records that failed, in attempt order.
    pub fn failed(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|r| !r.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Number of payloads that were actually transferred.
    pub fn transfer_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, DownloadOutcome::Fetched { .. }))
            .count()
    }

    /// Total bytes transferred.
    pub fn bytes_transferred(&self) -> u64 {
        self.records
            .iter()
            .map(|r| match r.outcome {
                DownloadOutcome::Fetched { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }

    /// Whether every attempted payload succeeded.
    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, outcome: DownloadOutcome) -> DownloadRecord {
        DownloadRecord {
            patch_name: "P".to_string(),
            file_name: name.to_string(),
            url: format!("https://h/{}", name),
            destination: PathBuf::from(name),
            platform: PayloadPlatform::Windows,
            outcome,
        }
    }

    #[test]
    fn test_ledger_counts() {
        let mut ledger = DownloadLedger::default();
        ledger.push(record("a.msp", DownloadOutcome::Fetched { bytes: 10 }));
        ledger.push(record("b.msp", DownloadOutcome::AlreadyPresent));
        ledger.push(record(
            "c.msp",
            DownloadOutcome::Failed {
                reason: "boom".to_string(),
            },
        ));
        ledger.push(record("d.msp", DownloadOutcome::Fetched { bytes: 5 }));

        assert_eq!(ledger.success_count(), 3);
        assert_eq!(ledger.failure_count(), 1);
        assert_eq!(ledger.transfer_count(), 2);
        assert_eq!(ledger.bytes_transferred(), 15);
        assert!(!ledger.is_clean());

        let failed: Vec<_> = ledger.failed().map(|r| r.file_name.as_str()).collect();
        assert_eq!(failed, vec!["c.msp"]);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            DownloadOutcome::Fetched { bytes: 3 }.to_string(),
            "fetched (3 bytes)"
        );
        assert_eq!(
            DownloadOutcome::Failed {
                reason: "404".to_string()
            }
            .to_string(),
            "failed: 404"
        );
    }
}
