//! Download orchestration.
//!
//! For every matched catalog entry the manager creates the patch's staging
//! directory, writes its descriptor, then fetches each payload:
//!
//! 1. Derive the file name and platform from the URL
//! 2. If the destination exists and a checksum is published, verify in place
//!    and skip the transfer on a match
//! 3. Fetch into `<file>.part`, verify, then rename into place
//!
//! Every failure is recorded in the [`DownloadLedger`] and the run continues.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::catalog::{filter, CatalogDocument, PatchCatalogEntry};
use crate::staging::{staging_dir_name, write_descriptor, PayloadPlatform};

use super::checksum::verify_checksum;
use super::config::DownloadConfig;
use super::error::{DownloadError, DownloadResult};
use super::http::{PayloadFetcher, ProgressCallback};
use super::record::{DownloadLedger, DownloadOutcome, DownloadRecord, SkippedUrl};

/// Suffix of in-flight downloads.
const PARTIAL_SUFFIX: &str = ".part";

/// Receives progress notifications during a download run.
///
/// All methods default to doing nothing.
pub trait DownloadObserver {
    /// A patch is about to be processed (`index` is 1-based).
    fn on_patch_start(&self, _index: usize, _total: usize, _entry: &PatchCatalogEntry) {}

    /// A file transfer is starting.
    fn on_file_start(&self, _file_name: &str) {}

    /// Bytes received so far for the current file; total is 0 if unknown.
    fn on_progress(&self, _downloaded: u64, _total: u64) {}

    /// A file has a final outcome.
    fn on_file_done(&self, _record: &DownloadRecord) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DownloadObserver for NoopObserver {}

/// Derive the payload file name from a URL's path.
///
/// Returns `None` for unparsable URLs and URLs whose path ends in `/`.
///
/// # Examples
///
/// ```
/// use patchpilot::download::payload_file_name;
///
/// assert_eq!(
///     payload_file_name("https://host/p/fix.msp?token=1"),
///     Some("fix.msp".to_string())
/// );
/// assert_eq!(payload_file_name("https://host/p/"), None);
/// ```
pub fn payload_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.last()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Downloads payloads for matched catalog entries.
pub struct DownloadManager<F: PayloadFetcher> {
    fetcher: F,
    config: DownloadConfig,
}

impl<F: PayloadFetcher> DownloadManager<F> {
    /// Create a manager using `fetcher` for transfers.
    pub fn new(fetcher: F, config: DownloadConfig) -> Self {
        Self { fetcher, config }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Resolve matching entries from `doc` and download all their payloads.
    pub fn run(&self, doc: &CatalogDocument, observer: &dyn DownloadObserver) -> DownloadLedger {
        let entries = filter(doc, &self.config.selector, self.config.platform);
        info!(
            version = %self.config.selector.version,
            platform = %self.config.platform,
            patches = entries.len(),
            "Resolved patches from catalog"
        );
        self.download_all(&entries, observer)
    }

    /// Download the payloads of every entry, in order.
    pub fn download_all(
        &self,
        entries: &[PatchCatalogEntry],
        observer: &dyn DownloadObserver,
    ) -> DownloadLedger {
        let mut ledger = DownloadLedger {
            patches_matched: entries.len(),
            ..Default::default()
        };
        let mut throttle = Throttle::new(self.config.throttle);

        for (index, entry) in entries.iter().enumerate() {
            observer.on_patch_start(index + 1, entries.len(), entry);
            info!(
                patch = %entry.name,
                qfe = %entry.qfe_display(),
                critical = %entry.critical,
                release_date = %entry.release_date,
                "[{}/{}] Processing patch",
                index + 1,
                entries.len()
            );
            self.download_patch(entry, &mut ledger, &mut throttle, observer);
        }

        info!(
            fetched = ledger.transfer_count(),
            succeeded = ledger.success_count(),
            failed = ledger.failure_count(),
            bytes = ledger.bytes_transferred(),
            "Download run complete"
        );
        ledger
    }

    fn download_patch(
        &self,
        entry: &PatchCatalogEntry,
        ledger: &mut DownloadLedger,
        throttle: &mut Throttle,
        observer: &dyn DownloadObserver,
    ) {
        if entry.patch_files.is_empty() {
            info!(patch = %entry.name, "No payload files listed");
            ledger.patches_without_files.push(entry.name.clone());
            return;
        }

        let patch_dir = self.config.patch_dir(&staging_dir_name(&entry.name));
        let setup_error = prepare_patch_dir(&patch_dir, entry).err();

        for url in &entry.patch_files {
            let Some(file_name) = payload_file_name(url) else {
                warn!(patch = %entry.name, url = %url, "Cannot derive a file name, skipping");
                ledger.skipped_urls.push(SkippedUrl {
                    patch_name: entry.name.clone(),
                    url: url.clone(),
                });
                continue;
            };

            let record = match &setup_error {
                Some(e) => DownloadRecord {
                    patch_name: entry.name.clone(),
                    destination: patch_dir.join(&file_name),
                    file_name,
                    url: url.clone(),
                    platform: PayloadPlatform::classify_url(url),
                    outcome: DownloadOutcome::Failed {
                        reason: e.to_string(),
                    },
                },
                None => self.download_file(entry, url, file_name, &patch_dir, throttle, observer),
            };

            observer.on_file_done(&record);
            ledger.push(record);
        }
    }

    /// Download one payload of `entry` into `patch_dir`.
    fn download_file(
        &self,
        entry: &PatchCatalogEntry,
        url: &str,
        file_name: String,
        patch_dir: &Path,
        throttle: &mut Throttle,
        observer: &dyn DownloadObserver,
    ) -> DownloadRecord {
        let platform = PayloadPlatform::classify_url(url);
        let dest_dir = match platform.subdir() {
            Some(sub) => patch_dir.join(sub),
            None => patch_dir.to_path_buf(),
        };
        let destination = dest_dir.join(&file_name);
        let checksum = entry.checksum_for(&file_name);

        let outcome = match self.fetch_verified(
            url,
            &dest_dir,
            &destination,
            checksum,
            throttle,
            observer,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(patch = %entry.name, file = %file_name, error = %e, "Download failed");
                DownloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        DownloadRecord {
            patch_name: entry.name.clone(),
            file_name,
            url: url.to_string(),
            destination,
            platform,
            outcome,
        }
    }

    fn fetch_verified(
        &self,
        url: &str,
        dest_dir: &Path,
        destination: &Path,
        checksum: Option<&str>,
        throttle: &mut Throttle,
        observer: &dyn DownloadObserver,
    ) -> DownloadResult<DownloadOutcome> {
        if destination.exists() {
            match checksum {
                Some(expected) => match verify_checksum(destination, expected) {
                    Ok(()) => {
                        info!(
                            file = %destination.display(),
                            "Existing file verified, skipping download"
                        );
                        return Ok(DownloadOutcome::AlreadyPresent);
                    }
                    Err(e) => {
                        warn!(
                            file = %destination.display(),
                            error = %e,
                            "Existing file failed verification, re-downloading"
                        );
                        remove_quietly(destination);
                    }
                },
                None => {
                    info!(
                        file = %destination.display(),
                        "Existing file has no published checksum, re-downloading"
                    );
                }
            }
        }

        fs::create_dir_all(dest_dir).map_err(|e| DownloadError::CreateDirFailed {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        throttle.wait();
        let partial = partial_path(destination);
        observer.on_file_start(&destination.file_name().unwrap_or_default().to_string_lossy());
        debug!(url = %url, dest = %partial.display(), "Fetching payload");

        let progress: ProgressCallback<'_> =
            &|downloaded: u64, total: u64| observer.on_progress(downloaded, total);
        let bytes = match self.fetcher.fetch(url, &partial, Some(progress)) {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_quietly(&partial);
                return Err(e);
            }
        };

        match checksum {
            Some(expected) => {
                if let Err(e) = verify_checksum(&partial, expected) {
                    remove_quietly(&partial);
                    return Err(e);
                }
                debug!(file = %destination.display(), "Checksum verified");
            }
            None => debug!(
                file = %destination.display(),
                "No published checksum, integrity check skipped"
            ),
        }

        if let Err(e) = fs::rename(&partial, destination) {
            remove_quietly(&partial);
            return Err(DownloadError::WriteFailed {
                path: destination.to_path_buf(),
                source: e,
            });
        }

        info!(file = %destination.display(), bytes, "Downloaded");
        Ok(DownloadOutcome::Fetched { bytes })
    }
}

/// Create the patch directory and write its descriptor.
fn prepare_patch_dir(patch_dir: &Path, entry: &PatchCatalogEntry) -> DownloadResult<()> {
    fs::create_dir_all(patch_dir).map_err(|e| DownloadError::CreateDirFailed {
        path: patch_dir.to_path_buf(),
        source: e,
    })?;
    write_descriptor(patch_dir, entry).map_err(|e| DownloadError::WriteFailed {
        path: patch_dir.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// `<file>.part` next to the destination.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(file = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

/// Politeness delay between network transfers.
struct Throttle {
    delay: std::time::Duration,
    armed: bool,
}

impl Throttle {
    fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            armed: false,
        }
    }

    /// Sleep if a transfer already happened in this run.
    fn wait(&mut self) {
        if self.armed && !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.armed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves canned bodies and counts requests.
    struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(bodies: &[(&str, &[u8])]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_vec()))
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PayloadFetcher for FakeFetcher {
        fn fetch(
            &self,
            url: &str,
            dest: &Path,
            progress: Option<ProgressCallback<'_>>,
        ) -> DownloadResult<u64> {
            self.calls.borrow_mut().push(url.to_string());
            let body = self.bodies.get(url).ok_or_else(|| DownloadError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })?;
            fs::write(dest, body).map_err(|e| DownloadError::WriteFailed {
                path: dest.to_path_buf(),
                source: e,
            })?;
            if let Some(cb) = progress {
                cb(body.len() as u64, body.len() as u64);
            }
            Ok(body.len() as u64)
        }
    }

    const HELLO_MD5: &str = "5EB63BBBE01EEED093CB22BB8F5ACDC3";

    fn manager(temp: &TempDir, fetcher: FakeFetcher) -> DownloadManager<FakeFetcher> {
        DownloadManager::new(
            fetcher,
            DownloadConfig::new(temp.path()).with_throttle(Duration::ZERO),
        )
    }

    fn entry(urls: &[&str], md5sums: &[&str]) -> PatchCatalogEntry {
        PatchCatalogEntry {
            patch_files: urls.iter().map(|s| s.to_string()).collect(),
            md5sums: md5sums.iter().map(|s| s.to_string()).collect(),
            ..PatchCatalogEntry::new("Test Patch: 1")
        }
    }

    #[test]
    fn test_payload_file_name() {
        assert_eq!(
            payload_file_name("http://x/a/b/patch1.msp"),
            Some("patch1.msp".to_string())
        );
        assert_eq!(payload_file_name("http://x"), None);
        assert_eq!(payload_file_name("not a url"), None);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/s/p/windows/fix.msp")),
            PathBuf::from("/s/p/windows/fix.msp.part")
        );
    }

    #[test]
    fn test_downloads_into_platform_subdirs() {
        let temp = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[
            ("http://x/fix.msp", b"win"),
            ("http://x/fix.tar.gz", b"lin"),
            ("http://x/readme.pdf", b"doc"),
        ]);
        let manager = manager(&temp, fetcher);
        let e = entry(
            &["http://x/fix.msp", "http://x/fix.tar.gz", "http://x/readme.pdf"],
            &[],
        );

        let ledger = manager.download_all(&[e], &NoopObserver);
        assert!(ledger.is_clean());

        let patch_dir = temp.path().join("Test_Patch__1");
        assert!(patch_dir.join("patch_info.json").is_file());
        assert_eq!(fs::read(patch_dir.join("windows/fix.msp")).unwrap(), b"win");
        assert_eq!(fs::read(patch_dir.join("linux/fix.tar.gz")).unwrap(), b"lin");
        assert_eq!(fs::read(patch_dir.join("readme.pdf")).unwrap(), b"doc");
    }

    #[test]
    fn test_checksum_mismatch_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("http://x/fix.msp", b"tampered")]);
        let manager = manager(&temp, fetcher);
        let md5 = format!("fix.msp:{}", HELLO_MD5);
        let e = entry(&["http://x/fix.msp"], &[md5.as_str()]);

        let ledger = manager.download_all(&[e], &NoopObserver);
        assert_eq!(ledger.failure_count(), 1);

        let windows_dir = temp.path().join("Test_Patch__1/windows");
        assert!(!windows_dir.join("fix.msp").exists());
        assert!(!windows_dir.join("fix.msp.part").exists());
    }

    #[test]
    fn test_verified_existing_file_not_refetched() {
        let temp = TempDir::new().unwrap();
        let windows_dir = temp.path().join("Test_Patch__1/windows");
        fs::create_dir_all(&windows_dir).unwrap();
        fs::write(windows_dir.join("fix.msp"), b"hello world").unwrap();

        let fetcher = FakeFetcher::new(&[("http://x/fix.msp", b"hello world")]);
        let manager = manager(&temp, fetcher);
        let md5 = format!("fix.msp:{}", HELLO_MD5);
        let e = entry(&["http://x/fix.msp"], &[md5.as_str()]);

        let ledger = manager.download_all(&[e], &NoopObserver);
        assert_eq!(ledger.records[0].outcome, DownloadOutcome::AlreadyPresent);
        assert!(manager.fetcher.calls.borrow().is_empty());
    }

    #[test]
    fn test_stale_existing_file_replaced() {
        let temp = TempDir::new().unwrap();
        let windows_dir = temp.path().join("Test_Patch__1/windows");
        fs::create_dir_all(&windows_dir).unwrap();
        fs::write(windows_dir.join("fix.msp"), b"stale").unwrap();

        let fetcher = FakeFetcher::new(&[("http://x/fix.msp", b"hello world")]);
        let manager = manager(&temp, fetcher);
        let md5 = format!("fix.msp:{}", HELLO_MD5);
        let e = entry(&["http://x/fix.msp"], &[md5.as_str()]);

        let ledger = manager.download_all(&[e], &NoopObserver);
        assert_eq!(
            ledger.records[0].outcome,
            DownloadOutcome::Fetched { bytes: 11 }
        );
        assert_eq!(fs::read(windows_dir.join("fix.msp")).unwrap(), b"hello world");
    }

    #[test]
    fn test_failure_does_not_stop_run() {
        let temp = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new(&[("http://x/b.msp", b"ok")]);
        let manager = manager(&temp, fetcher);
        let e = entry(&["http://x/a.msp", "http://x/b.msp"], &[]);

        let ledger = manager.download_all(&[e], &NoopObserver);
        assert_eq!(ledger.failure_count(), 1);
        assert_eq!(ledger.success_count(), 1);
        assert!(matches!(
            &ledger.records[0].outcome,
            DownloadOutcome::Failed { reason } if reason.contains("404")
        ));
    }

    #[test]
    fn test_patch_without_files_and_bad_urls() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, FakeFetcher::new(&[]));
        let empty = PatchCatalogEntry::new("Empty");
        let bad = entry(&["http://x/dir/"], &[]);

        let ledger = manager.download_all(&[empty, bad], &NoopObserver);
        assert_eq!(ledger.patches_matched, 2);
        assert_eq!(ledger.patches_without_files, vec!["Empty".to_string()]);
        assert_eq!(ledger.skipped_urls.len(), 1);
        assert!(ledger.records.is_empty());
        assert!(!temp.path().join("Empty").exists());
    }

    #[test]
    fn test_throttle_only_between_transfers() {
        let mut throttle = Throttle::new(Duration::from_millis(1));
        assert!(!throttle.armed);
        throttle.wait();
        assert!(throttle.armed);
    }
}
