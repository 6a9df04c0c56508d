//! Integration tests for the apply pipeline.
//!
//! These tests stage patches on disk the way the download manager does and
//! run the apply engine against in-memory installer, service and version
//! fakes:
//! - critical patches are applied before older non-critical ones
//! - a timed-out installer fails its patch and the run, and the report lists it
//! - one failing patch does not stop the others
//!
//! Run with: `cargo test --test apply_pipeline`

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use patchpilot::apply::{
    ApplyConfig, ApplyEngine, InstallerFailure, InstallerRunner, NoopApplyObserver, RunOutcome,
};
use patchpilot::catalog::PatchCatalogEntry;
use patchpilot::install::{
    latest_backup, restore, ServiceControlWarning, ServiceController, ServiceState, VersionProbe,
};
use patchpilot::report::write_apply_report;
use patchpilot::staging::{staging_dir_name, write_descriptor, PayloadFile, ScanLayout};

// ============================================================================
// Helper Functions
// ============================================================================

/// Payloads named in `hang` time out and those in `fail` exit with 1603.
#[derive(Default)]
struct ScriptedRunner {
    hang: Vec<String>,
    fail: Vec<String>,
}

impl InstallerRunner for ScriptedRunner {
    fn run(&self, payload: &PayloadFile, timeout: Duration) -> Result<(), InstallerFailure> {
        let name = payload.file_name();
        if self.hang.contains(&name) {
            return Err(InstallerFailure::TimedOut {
                secs: timeout.as_secs(),
            });
        }
        if self.fail.contains(&name) {
            return Err(InstallerFailure::NonZeroExit {
                code: Some(1603),
                output: "Fatal error during installation.".to_string(),
            });
        }
        Ok(())
    }
}

/// Tracks a running flag per service; "Portal for ArcGIS" is not installed.
#[derive(Default)]
struct MemoryServices {
    stopped: RefCell<Vec<String>>,
}

impl ServiceController for MemoryServices {
    fn stop(&self, name: &str) -> Result<(), ServiceControlWarning> {
        if name == "Portal for ArcGIS" {
            return Err(ServiceControlWarning::NotFound {
                service: name.to_string(),
            });
        }
        self.stopped.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), ServiceControlWarning> {
        if name == "Portal for ArcGIS" {
            return Err(ServiceControlWarning::NotFound {
                service: name.to_string(),
            });
        }
        self.stopped.borrow_mut().retain(|s| s != name);
        Ok(())
    }

    fn query(&self, name: &str) -> ServiceState {
        if name == "Portal for ArcGIS" {
            ServiceState::NotFound
        } else if self.stopped.borrow().iter().any(|s| s == name) {
            ServiceState::Stopped
        } else {
            ServiceState::Running
        }
    }
}

struct FixedVersion(&'static str);

impl VersionProbe for FixedVersion {
    fn product_version(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

struct Site {
    temp: TempDir,
}

impl Site {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("Server");
        fs::create_dir_all(install.join("framework")).unwrap();
        fs::write(install.join("framework/core.jar"), b"v1").unwrap();
        Self { temp }
    }

    fn staging(&self) -> PathBuf {
        self.temp.path().join("staging")
    }

    fn install(&self) -> PathBuf {
        self.temp.path().join("Server")
    }

    fn backups(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    /// Stage a patch with payloads under `windows/`, as downloads leave them.
    fn stage(&self, name: &str, critical: &str, date: &str, files: &[&str]) {
        let dir = self.staging().join(staging_dir_name(name));
        let payload_dir = dir.join("windows");
        fs::create_dir_all(&payload_dir).unwrap();

        let mut entry = PatchCatalogEntry::new(name);
        entry.critical = critical.to_string();
        entry.release_date = date.to_string();
        entry.qfe_id = Some(format!("QFE-{}", name.len()));
        write_descriptor(&dir, &entry).unwrap();

        for file in files {
            fs::write(payload_dir.join(file), b"installer").unwrap();
        }
    }

    fn config(&self) -> ApplyConfig {
        ApplyConfig::new(self.staging())
            .with_install_path(self.install())
            .with_backup_dir(self.backups())
            .with_layout(ScanLayout::Auto)
            .with_services(vec![
                "ArcGIS Server".to_string(),
                "Portal for ArcGIS".to_string(),
            ])
            .with_settle(Duration::ZERO, Duration::ZERO)
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A newer critical patch is applied before an older low-priority one.
#[test]
fn test_critical_patch_applied_first() {
    let site = Site::new();
    site.stage("Low Patch", "low", "2023-01-01", &["low.msp"]);
    site.stage("Critical Patch", "Critical", "2024-01-01", &["critical.msp"]);

    let engine = ApplyEngine::new(
        site.config(),
        ScriptedRunner::default(),
        MemoryServices::default(),
        FixedVersion("11.1"),
    );
    let run = engine.run(&NoopApplyObserver);

    assert_eq!(run.outcome, RunOutcome::CompletedAllApplied);
    let order: Vec<_> = run.ledger.applied.iter().map(|r| r.name()).collect();
    assert_eq!(order, vec!["Critical Patch", "Low Patch"]);
}

/// The only installer timing out fails the patch, the run and the report.
#[test]
fn test_timed_out_installer_is_partial_failure() {
    let site = Site::new();
    site.stage("Slow Patch", "Security", "2024-01-01", &["slow.msp"]);

    let runner = ScriptedRunner {
        hang: names(&["slow.msp"]),
        ..Default::default()
    };
    let engine = ApplyEngine::new(
        site.config().with_installer_timeout(Duration::from_secs(300)),
        runner,
        MemoryServices::default(),
        FixedVersion("11.1"),
    );
    let run = engine.run(&NoopApplyObserver);

    assert_eq!(run.outcome, RunOutcome::CompletedPartial);
    assert_ne!(run.exit_code(), 0);
    assert!(run.ledger.applied.is_empty());
    assert_eq!(run.ledger.failed.len(), 1);
    let record = &run.ledger.failed[0];
    assert!(!record.success);
    assert_eq!(record.attempts[0].exit_code, None);

    let log_dir = site.temp.path().join("logs");
    let report = write_apply_report(&run, &site.staging(), &site.backups(), &log_dir)
        .unwrap()
        .unwrap();
    let text = fs::read_to_string(report).unwrap();
    assert!(text.contains("Failed Patches: 1"));
    assert!(text.contains("Successfully Applied Patches: 0"));
    assert_eq!(text.matches("✗ ").count(), 1);
    assert!(text.contains("installer timed out after 300s"));
}

/// A failing patch is isolated; all others are still attempted and applied.
#[test]
fn test_partial_failure_isolation() {
    let site = Site::new();
    site.stage("First", "", "2023-01-01", &["first.msp"]);
    site.stage("Second", "", "2023-02-01", &["second_a.msp", "second_b.exe"]);
    site.stage("Third", "", "2023-03-01", &["third.exe"]);

    let runner = ScriptedRunner {
        fail: names(&["second_a.msp"]),
        ..Default::default()
    };
    let engine = ApplyEngine::new(
        site.config(),
        runner,
        MemoryServices::default(),
        FixedVersion("11.1"),
    );
    let run = engine.run(&NoopApplyObserver);

    let applied: Vec<_> = run.ledger.applied.iter().map(|r| r.name()).collect();
    let failed: Vec<_> = run.ledger.failed.iter().map(|r| r.name()).collect();
    assert_eq!(applied, vec!["First", "Third"]);
    assert_eq!(failed, vec!["Second"]);
    assert_eq!(run.ledger.failed[0].attempts.len(), 2);
    assert_eq!(run.outcome, RunOutcome::CompletedPartial);
}

/// Services are bracketed; a missing service is a warning, not a failure.
#[test]
fn test_services_bracketed_and_verified() {
    let site = Site::new();
    site.stage("Only", "true", "2024-05-01", &["only.msp"]);

    let engine = ApplyEngine::new(
        site.config(),
        ScriptedRunner::default(),
        MemoryServices::default(),
        FixedVersion("11.1.0.41833"),
    );
    let run = engine.run(&NoopApplyObserver);

    let stopped = run.services_stopped.as_ref().unwrap();
    assert_eq!(stopped.affected, names(&["ArcGIS Server"]));
    assert_eq!(stopped.warnings.len(), 1);

    let verification = run.verification.as_ref().unwrap();
    assert_eq!(verification.running, 1);
    assert_eq!(verification.bracketed, 2);
    assert_eq!(verification.version_after.as_deref(), Some("11.1.0.41833"));
    assert_eq!(run.outcome, RunOutcome::CompletedAllApplied);
}

/// The backup taken before applying can be restored by an operator.
#[test]
fn test_backup_then_operator_restore() {
    let site = Site::new();
    site.stage("Only", "", "", &["only.msp"]);

    let engine = ApplyEngine::new(
        site.config().with_keep_backups(1),
        ScriptedRunner::default(),
        MemoryServices::default(),
        FixedVersion("11.1"),
    );
    engine.run(&NoopApplyObserver);
    engine.run(&NoopApplyObserver);

    let latest = latest_backup(&site.backups()).unwrap();
    assert_eq!(fs::read_dir(site.backups()).unwrap().count(), 1);

    let core = site.install().join("framework/core.jar");
    fs::write(&core, b"corrupted").unwrap();
    restore(&latest, &site.install()).unwrap();
    assert_eq!(fs::read(core).unwrap(), b"v1");
}

/// An empty staging directory aborts before touching anything.
#[test]
fn test_empty_staging_aborts() {
    let site = Site::new();
    fs::create_dir_all(site.staging()).unwrap();

    let engine = ApplyEngine::new(
        site.config(),
        ScriptedRunner::default(),
        MemoryServices::default(),
        FixedVersion("11.1"),
    );
    let run = engine.run(&NoopApplyObserver);

    assert_eq!(run.outcome, RunOutcome::AbortedNoPatches);
    assert_eq!(run.exit_code(), 1);
    assert!(run.services_stopped.is_none());
    assert!(!site.backups().exists());
}
