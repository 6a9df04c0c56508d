//! Human-readable run reports.
//!
//! Both reports are plain sectioned text: a header, totals, then the
//! successful entries followed by the failed ones. [`DownloadSummary`] and
//! [`ApplyReport`] render through `Display`; the `write_*` functions persist
//! them under timestamped names.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::apply::{ApplyRecord, ApplyRun, BackupStatus, RunOutcome};
use crate::download::DownloadLedger;

const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const DISPLAY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// File name of a download summary generated at `at`.
pub fn download_summary_file_name(at: &DateTime<Local>) -> String {
    format!("download_summary_{}.txt", at.format(FILE_TIMESTAMP))
}

/// File name of an apply report generated at `at`.
pub fn apply_report_file_name(at: &DateTime<Local>) -> String {
    format!("patch_application_report_{}.txt", at.format(FILE_TIMESTAMP))
}

/// Download ledger rendered as a summary report.
pub struct DownloadSummary<'a> {
    pub ledger: &'a DownloadLedger,
    pub output_dir: &'a Path,
    pub generated_at: DateTime<Local>,
}

impl fmt::Display for DownloadSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.ledger;

        writeln!(f, "Patch Download Summary")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        writeln!(
            f,
            "Download Date: {}",
            self.generated_at.format(DISPLAY_TIMESTAMP)
        )?;
        writeln!(f, "Output Directory: {}", self.output_dir.display())?;
        writeln!(f, "Patches Matched: {}", ledger.patches_matched)?;
        writeln!(f, "Files Succeeded: {}", ledger.success_count())?;
        writeln!(f, "Files Transferred: {}", ledger.transfer_count())?;
        writeln!(f, "Bytes Transferred: {}", ledger.bytes_transferred())?;
        writeln!(f, "Failed Downloads: {}", ledger.failure_count())?;

        if ledger.success_count() > 0 {
            writeln!(f)?;
            writeln!(f, "Successfully Downloaded Files:")?;
            writeln!(f, "{}", "-".repeat(30))?;
            for record in ledger.succeeded() {
                writeln!(f, "Patch: {}", record.patch_name)?;
                writeln!(f, "File: {}", record.file_name)?;
                writeln!(f, "Platform: {}", record.platform)?;
                writeln!(f, "Path: {}", record.destination.display())?;
                writeln!(f, "Status: {}", record.outcome)?;
                writeln!(f, "{}", "-".repeat(30))?;
            }
        }

        if ledger.failure_count() > 0 {
            writeln!(f)?;
            writeln!(f, "Failed Downloads:")?;
            writeln!(f, "{}", "-".repeat(20))?;
            for record in ledger.failed() {
                writeln!(f, "Patch: {}", record.patch_name)?;
                writeln!(f, "File: {}", record.file_name)?;
                writeln!(f, "URL: {}", record.url)?;
                writeln!(f, "Error: {}", record.outcome)?;
                writeln!(f, "{}", "-".repeat(20))?;
            }
        }

        if !ledger.patches_without_files.is_empty() {
            writeln!(f)?;
            writeln!(f, "Patches Without Files:")?;
            for name in &ledger.patches_without_files {
                writeln!(f, "  {}", name)?;
            }
        }

        if !ledger.skipped_urls.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped URLs (no file name):")?;
            for skipped in &ledger.skipped_urls {
                writeln!(f, "  {} ({})", skipped.url, skipped.patch_name)?;
            }
        }

        Ok(())
    }
}

/// Write a download summary into `summary_dir`, creating it if needed.
///
/// Returns the path of the written report.
pub fn write_download_summary(
    ledger: &DownloadLedger,
    output_dir: &Path,
    summary_dir: &Path,
) -> io::Result<PathBuf> {
    let summary = DownloadSummary {
        ledger,
        output_dir,
        generated_at: Local::now(),
    };
    let path = summary_dir.join(download_summary_file_name(&summary.generated_at));
    write_report(&path, &summary.to_string())?;
    Ok(path)
}

/// Apply run rendered as a report.
pub struct ApplyReport<'a> {
    pub run: &'a ApplyRun,
    pub patches_dir: &'a Path,
    pub backup_dir: &'a Path,
}

impl fmt::Display for ApplyReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.run;

        writeln!(f, "Patch Application Report")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        writeln!(
            f,
            "Application Date: {}",
            run.started_at.format(DISPLAY_TIMESTAMP)
        )?;
        writeln!(f, "Duration: {}s", run.duration().num_seconds())?;
        writeln!(f, "Outcome: {}", run.outcome)?;
        writeln!(
            f,
            "Install Path: {}",
            run.preflight.install_path.display()
        )?;
        writeln!(f, "Patches Directory: {}", self.patches_dir.display())?;
        writeln!(f, "Backup Directory: {}", self.backup_dir.display())?;
        writeln!(
            f,
            "Version Before: {}",
            run.preflight.version.as_deref().unwrap_or("unknown")
        )?;
        if let Some(verification) = &run.verification {
            writeln!(
                f,
                "Version After: {}",
                verification.version_after.as_deref().unwrap_or("unknown")
            )?;
        }
        writeln!(f)?;

        write_backup(f, &run.backup)?;
        if let Some(warning) = &run.prune_warning {
            writeln!(f, "Backup Pruning: {}", warning)?;
        }
        for pruned in &run.pruned {
            writeln!(f, "Pruned Backup: {}", pruned.display())?;
        }
        writeln!(f)?;

        writeln!(f, "Patches Discovered: {}", run.discovered)?;
        if !run.filtered_out.is_empty() {
            writeln!(
                f,
                "Filtered Out (critical only): {}",
                run.filtered_out.len()
            )?;
        }
        for name in &run.skipped_empty {
            writeln!(f, "Skipped (no installers): {}", name)?;
        }
        for warning in &run.discovery_warnings {
            writeln!(f, "Discovery Warning: {}", warning)?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "Successfully Applied Patches: {}",
            run.ledger.applied.len()
        )?;
        writeln!(f, "{}", "-".repeat(30))?;
        for record in &run.ledger.applied {
            write_record(f, "✓", record)?;
        }

        writeln!(f, "Failed Patches: {}", run.ledger.failed.len())?;
        writeln!(f, "{}", "-".repeat(20))?;
        for record in &run.ledger.failed {
            write_record(f, "✗", record)?;
            for attempt in record.failed_attempts() {
                if let Some(failure) = &attempt.failure {
                    writeln!(f, "  {} ({}): {}", attempt.file_name(), attempt.kind, failure)?;
                }
            }
            writeln!(f)?;
        }

        let service_reports = [&run.services_stopped, &run.services_started];
        for warning in service_reports
            .into_iter()
            .flatten()
            .flat_map(|report| &report.warnings)
        {
            writeln!(f, "Service Warning: {}", warning)?;
        }

        if let Some(verification) = &run.verification {
            writeln!(
                f,
                "Services Running: {}/{}",
                verification.running, verification.bracketed
            )?;
            for (service, state) in &verification.states {
                writeln!(f, "  {}: {}", service, state)?;
            }
        }

        Ok(())
    }
}

fn write_backup(f: &mut fmt::Formatter<'_>, status: &BackupStatus) -> fmt::Result {
    match status {
        BackupStatus::NotNeeded => writeln!(f, "Backup: not needed"),
        BackupStatus::Skipped => writeln!(f, "Backup: skipped"),
        BackupStatus::Created(result) => writeln!(
            f,
            "Backup: {} ({} files, {} bytes)",
            result.path.display(),
            result.files,
            result.bytes
        ),
        BackupStatus::Failed(warning) => writeln!(f, "Backup: FAILED ({})", warning),
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, mark: &str, record: &ApplyRecord) -> fmt::Result {
    let descriptor = &record.descriptor;
    writeln!(f, "{} {}", mark, descriptor.name)?;
    writeln!(f, "  QFE ID: {}", descriptor.qfe_display())?;
    writeln!(f, "  Critical: {}", descriptor.critical)?;
    writeln!(f, "  Release Date: {}", descriptor.release_date)?;
    if record.success {
        writeln!(f)?;
    }
    Ok(())
}

/// Write an apply report into `log_dir`, creating it if needed.
///
/// Nothing is written for a run that aborted before finding any patch.
pub fn write_apply_report(
    run: &ApplyRun,
    patches_dir: &Path,
    backup_dir: &Path,
    log_dir: &Path,
) -> io::Result<Option<PathBuf>> {
    if run.outcome == RunOutcome::AbortedNoPatches {
        return Ok(None);
    }

    let report = ApplyReport {
        run,
        patches_dir,
        backup_dir,
    };
    let path = log_dir.join(apply_report_file_name(&run.finished_at));
    write_report(&path, &report.to_string())?;
    Ok(Some(path))
}

fn write_report(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}
