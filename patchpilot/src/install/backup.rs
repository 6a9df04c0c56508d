//! Install tree backup, pruning and operator restore.
//!
//! Backups are plain recursive copies named `install_backup_<YYYYmmdd_HHMMSS>`
//! under a backup root, so lexical order is chronological order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix of every backup directory name.
pub const BACKUP_PREFIX: &str = "install_backup_";

/// Timestamp format of backup directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Why a backup could not be made. The apply run continues without one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackupWarning {
    /// The install path does not exist or is not a directory.
    #[error("install path does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The backup destination could not be created.
    #[error("cannot create backup directory {}: {reason}", path.display())]
    DestinationFailed { path: PathBuf, reason: String },

    /// Copying the tree failed part way.
    #[error("backup copy failed at {}: {reason}", path.display())]
    CopyFailed { path: PathBuf, reason: String },

    /// An old backup could not be removed while pruning.
    #[error("cannot remove old backup {}: {reason}", path.display())]
    PruneFailed { path: PathBuf, reason: String },
}

/// Errors from an operator-invoked restore.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// No backup exists under the backup root.
    #[error("no backups found in {}", .0.display())]
    NoBackups(PathBuf),

    /// The chosen backup path is not a directory.
    #[error("backup not found: {}", .0.display())]
    BackupMissing(PathBuf),

    /// Copying the backup over the install path failed.
    #[error("restore failed at {}: {source}", path.display())]
    CopyFailed { path: PathBuf, source: io::Error },
}

/// A completed copy of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    /// Where the copy lives.
    pub path: PathBuf,
    pub files: u64,
    pub bytes: u64,
    pub duration: Duration,
}

/// File and byte counts from a recursive copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Copy `install_path` into a new timestamped directory under `backup_root`.
///
/// A partial copy is removed on failure so it is never mistaken for a
/// usable backup.
pub fn backup(install_path: &Path, backup_root: &Path) -> Result<BackupResult, BackupWarning> {
    if !install_path.is_dir() {
        return Err(BackupWarning::SourceMissing(install_path.to_path_buf()));
    }

    fs::create_dir_all(backup_root).map_err(|e| BackupWarning::DestinationFailed {
        path: backup_root.to_path_buf(),
        reason: e.to_string(),
    })?;

    let destination = unique_backup_path(backup_root);
    info!(
        source = %install_path.display(),
        destination = %destination.display(),
        "Creating backup of install tree"
    );

    let started = Instant::now();
    match copy_dir_recursive(install_path, &destination) {
        Ok(stats) => {
            let result = BackupResult {
                path: destination,
                files: stats.files,
                bytes: stats.bytes,
                duration: started.elapsed(),
            };
            info!(
                path = %result.path.display(),
                files = result.files,
                bytes = result.bytes,
                "Backup created"
            );
            Ok(result)
        }
        Err((path, e)) => {
            if let Err(cleanup) = fs::remove_dir_all(&destination) {
                debug!(
                    path = %destination.display(),
                    error = %cleanup,
                    "Partial backup cleanup failed"
                );
            }
            Err(BackupWarning::CopyFailed {
                path,
                reason: e.to_string(),
            })
        }
    }
}

/// Pick `install_backup_<now>`, adding `_N` if that name is taken.
fn unique_backup_path(backup_root: &Path) -> PathBuf {
    let base = format!("{}{}", BACKUP_PREFIX, Local::now().format(TIMESTAMP_FORMAT));
    let mut candidate = backup_root.join(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = backup_root.join(format!("{}_{}", base, n));
        n += 1;
    }
    candidate
}

/// All backups under `backup_root`, oldest first.
///
/// A missing root yields an empty list.
pub fn list_backups(backup_root: &Path) -> io::Result<Vec<PathBuf>> {
    if !backup_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut backups: Vec<PathBuf> = fs::read_dir(backup_root)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(BACKUP_PREFIX))
        .map(|entry| entry.path())
        .collect();
    backups.sort();
    Ok(backups)
}

/// The newest backup under `backup_root`, if any.
pub fn latest_backup(backup_root: &Path) -> Option<PathBuf> {
    list_backups(backup_root).ok()?.pop()
}

/// Remove all but the newest `keep` backups. `keep == 0` keeps everything.
///
/// Returns the removed paths. Stops at the first removal failure.
pub fn prune_backups(backup_root: &Path, keep: usize) -> Result<Vec<PathBuf>, BackupWarning> {
    if keep == 0 {
        return Ok(Vec::new());
    }

    let backups = list_backups(backup_root).map_err(|e| BackupWarning::PruneFailed {
        path: backup_root.to_path_buf(),
        reason: e.to_string(),
    })?;

    let excess = backups.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for old in backups.into_iter().take(excess) {
        fs::remove_dir_all(&old).map_err(|e| BackupWarning::PruneFailed {
            path: old.clone(),
            reason: e.to_string(),
        })?;
        info!(path = %old.display(), "Pruned old backup");
        removed.push(old);
    }
    Ok(removed)
}

/// Copy a backup back over the install path.
///
/// Files present in the backup overwrite their counterparts; files that only
/// exist in the install tree are left in place.
pub fn restore(backup_path: &Path, install_path: &Path) -> Result<CopyStats, RestoreError> {
    if !backup_path.is_dir() {
        return Err(RestoreError::BackupMissing(backup_path.to_path_buf()));
    }

    warn!(
        backup = %backup_path.display(),
        install_path = %install_path.display(),
        "Restoring install tree from backup"
    );

    let stats = copy_dir_recursive(backup_path, install_path)
        .map_err(|(path, source)| RestoreError::CopyFailed { path, source })?;

    info!(files = stats.files, bytes = stats.bytes, "Restore complete");
    Ok(stats)
}

/// Restore the newest backup under `backup_root`.
pub fn restore_latest(
    backup_root: &Path,
    install_path: &Path,
) -> Result<(PathBuf, CopyStats), RestoreError> {
    let latest = latest_backup(backup_root)
        .ok_or_else(|| RestoreError::NoBackups(backup_root.to_path_buf()))?;
    let stats = restore(&latest, install_path)?;
    Ok((latest, stats))
}

/// Recursively copy `source` into `dest`, creating directories as needed.
///
/// On failure returns the path being processed and the I/O error.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<CopyStats, (PathBuf, io::Error)> {
    let mut stats = CopyStats::default();
    copy_into(source, dest, &mut stats)?;
    Ok(stats)
}

fn copy_into(
    source: &Path,
    dest: &Path,
    stats: &mut CopyStats,
) -> Result<(), (PathBuf, io::Error)> {
    fs::create_dir_all(dest).map_err(|e| (dest.to_path_buf(), e))?;

    for entry in fs::read_dir(source).map_err(|e| (source.to_path_buf(), e))? {
        let entry = entry.map_err(|e| (source.to_path_buf(), e))?;
        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            copy_into(&source_path, &dest_path, stats)?;
        } else {
            let bytes = fs::copy(&source_path, &dest_path).map_err(|e| (source_path.clone(), e))?;
            stats.files += 1;
            stats.bytes += bytes;
        }
    }

    Ok(())
}
