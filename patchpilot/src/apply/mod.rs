//! Patch application.
//!
//! [`ApplyEngine`] scans the staging directory, orders the patches, brackets
//! the work with a backup and a service stop/start cycle, and runs every
//! installer payload out of process through an [`InstallerRunner`]. The
//! result is an [`ApplyRun`] describing everything that happened.

mod config;
mod engine;
mod record;
mod runner;

pub use config::{
    ApplyConfig, DEFAULT_BACKUP_DIR, DEFAULT_INSTALLER_TIMEOUT, DEFAULT_INSTALL_PATH,
    DEFAULT_START_SETTLE, DEFAULT_STOP_SETTLE,
};
pub use engine::{
    retain_critical, sort_for_apply, ApplyEngine, ApplyObserver, ApplyPlan, ApplyRun,
    BackupStatus, NoopApplyObserver, PreflightReport, RunOutcome, RunStage, Verification,
};
pub use record::{ApplyLedger, ApplyRecord, FileApplyAttempt};
pub use runner::{InstallerFailure, InstallerRunner, ProcessInstallerRunner};
