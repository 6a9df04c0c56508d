//! The apply state machine.
//!
//! ```text
//! Discover -> FilterCritical -> Sort -> Backup -> StopServices
//!          -> ApplyEach -> StartServices -> Verify
//! ```
//!
//! Only an empty inventory aborts a run. Backup, service control and
//! verification problems are carried in the returned [`ApplyRun`] as
//! warnings, and every patch and payload is attempted regardless of earlier
//! failures. Writing the report is left to the caller.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::catalog::apply_order_key;
use crate::install::{
    backup, prune_backups, query_services, start_services, stop_services, BackupResult,
    BackupWarning, ServiceControlReport, ServiceController, ServiceState, VersionProbe,
};
use crate::staging::{scan, DiscoveryWarning, PayloadFile, StagedPatch};

use super::config::ApplyConfig;
use super::record::{ApplyLedger, ApplyRecord, FileApplyAttempt};
use super::runner::InstallerRunner;

/// Stages of an apply run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Discover,
    FilterCritical,
    Sort,
    Backup,
    StopServices,
    ApplyEach,
    StartServices,
    Verify,
}

impl RunStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::FilterCritical => "filter-critical",
            Self::Sort => "sort",
            Self::Backup => "backup",
            Self::StopServices => "stop-services",
            Self::ApplyEach => "apply",
            Self::StartServices => "start-services",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of an apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every patch left after filtering applied cleanly (possibly zero).
    CompletedAllApplied,
    /// At least one patch failed.
    CompletedPartial,
    /// The staging directory held no applicable patch.
    AbortedNoPatches,
}

impl RunOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CompletedAllApplied => 0,
            Self::CompletedPartial | Self::AbortedNoPatches => 1,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompletedAllApplied => write!(f, "completed: all patches applied"),
            Self::CompletedPartial => write!(f, "completed: some patches failed"),
            Self::AbortedNoPatches => write!(f, "aborted: no patches found"),
        }
    }
}

/// Advisory checks taken before anything is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub install_path: PathBuf,
    pub install_path_exists: bool,
    pub services: Vec<(String, ServiceState)>,
    pub version: Option<String>,
}

impl PreflightReport {
    /// Number of services reported running.
    pub fn running_services(&self) -> usize {
        count_running(&self.services)
    }
}

/// What happened to the install tree backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    /// Nothing was going to be applied, so no backup was needed.
    NotNeeded,
    /// Disabled by configuration.
    Skipped,
    Created(BackupResult),
    /// The backup failed; the run continued without one.
    Failed(BackupWarning),
}

/// Post-apply checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Bracketed services reporting running.
    pub running: usize,
    /// Number of bracketed services.
    pub bracketed: usize,
    pub states: Vec<(String, ServiceState)>,
    pub version_after: Option<String>,
}

/// The ordered set of patches a run would apply.
#[derive(Debug, Clone, Default)]
pub struct ApplyPlan {
    /// Patches in apply order.
    pub patches: Vec<StagedPatch>,

    /// Applicable patches found before the critical-only filter.
    pub discovered: usize,

    /// Patches with a descriptor but no payloads.
    pub skipped_empty: Vec<String>,

    /// Patches dropped by the critical-only filter.
    pub filtered_out: Vec<String>,

    pub warnings: Vec<DiscoveryWarning>,
}

/// Everything a run did, threaded through the stages and returned.
#[derive(Debug, Clone)]
pub struct ApplyRun {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub preflight: PreflightReport,
    pub discovered: usize,
    pub skipped_empty: Vec<String>,
    pub filtered_out: Vec<String>,
    pub discovery_warnings: Vec<DiscoveryWarning>,
    pub ledger: ApplyLedger,
    pub backup: BackupStatus,

    /// Old backups removed after a successful backup.
    pub pruned: Vec<PathBuf>,
    pub prune_warning: Option<BackupWarning>,

    pub services_stopped: Option<ServiceControlReport>,
    pub services_started: Option<ServiceControlReport>,
    pub verification: Option<Verification>,
}

impl ApplyRun {
    fn new(started_at: DateTime<Local>, preflight: PreflightReport, plan: &ApplyPlan) -> Self {
        Self {
            outcome: RunOutcome::AbortedNoPatches,
            started_at,
            finished_at: started_at,
            preflight,
            discovered: plan.discovered,
            skipped_empty: plan.skipped_empty.clone(),
            filtered_out: plan.filtered_out.clone(),
            discovery_warnings: plan.warnings.clone(),
            ledger: ApplyLedger::default(),
            backup: BackupStatus::NotNeeded,
            pruned: Vec::new(),
            prune_warning: None,
            services_stopped: None,
            services_started: None,
            verification: None,
        }
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Process exit status for the run.
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

/// Receives progress notifications during an apply run.
///
/// All methods default to doing nothing.
pub trait ApplyObserver {
    fn on_stage(&self, _stage: RunStage) {}

    /// A patch is about to be applied (`index` is 1-based).
    fn on_patch_start(&self, _index: usize, _total: usize, _patch: &StagedPatch) {}

    fn on_file_start(&self, _payload: &PayloadFile) {}

    fn on_file_done(&self, _attempt: &FileApplyAttempt) {}

    fn on_patch_done(&self, _record: &ApplyRecord) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopApplyObserver;

impl ApplyObserver for NoopApplyObserver {}

/// Stable sort into apply order: high-priority first, then by release date.
pub fn sort_for_apply(patches: &mut [StagedPatch]) {
    patches.sort_by_key(|p| apply_order_key(&p.descriptor.critical, &p.descriptor.release_date));
}

/// Split off patches that are not high-priority.
///
/// Returns the kept patches (order preserved) and the names of the dropped
/// ones.
pub fn retain_critical(patches: Vec<StagedPatch>) -> (Vec<StagedPatch>, Vec<String>) {
    let (kept, dropped): (Vec<_>, Vec<_>) = patches
        .into_iter()
        .partition(|p| p.descriptor.criticality().is_high());
    let dropped = dropped.into_iter().map(|p| p.descriptor.name).collect();
    (kept, dropped)
}

/// Applies staged patches to an installation.
pub struct ApplyEngine<R, S, V>
where
    R: InstallerRunner,
    S: ServiceController,
    V: VersionProbe,
{
    config: ApplyConfig,
    runner: R,
    services: S,
    probe: V,
}

impl<R, S, V> ApplyEngine<R, S, V>
where
    R: InstallerRunner,
    S: ServiceController,
    V: VersionProbe,
{
    pub fn new(config: ApplyConfig, runner: R, services: S, probe: V) -> Self {
        Self {
            config,
            runner,
            services,
            probe,
        }
    }

    pub fn config(&self) -> &ApplyConfig {
        &self.config
    }

    /// Log and collect the state of the installation. Changes nothing.
    pub fn preflight(&self) -> PreflightReport {
        let install_path = self.config.install_path.clone();
        let install_path_exists = install_path.is_dir();
        if install_path_exists {
            info!(path = %install_path.display(), "Install path found");
        } else {
            warn!(path = %install_path.display(), "Install path does not exist");
        }

        let services = query_services(&self.services, &self.config.services);
        let version = self.probe.product_version();

        PreflightReport {
            install_path,
            install_path_exists,
            services,
            version,
        }
    }

    /// Discover, filter and order the staged patches without applying them.
    pub fn plan(&self, observer: &dyn ApplyObserver) -> ApplyPlan {
        observer.on_stage(RunStage::Discover);
        let inventory = scan(&self.config.patches_dir, self.config.layout);

        let mut plan = ApplyPlan {
            discovered: inventory.patches.len(),
            skipped_empty: inventory.skipped_empty,
            warnings: inventory.warnings,
            ..Default::default()
        };
        let mut patches = inventory.patches;

        if self.config.critical_only {
            observer.on_stage(RunStage::FilterCritical);
            let (kept, dropped) = retain_critical(patches);
            info!(
                kept = kept.len(),
                dropped = dropped.len(),
                "Critical-only filter applied"
            );
            patches = kept;
            plan.filtered_out = dropped;
        }

        observer.on_stage(RunStage::Sort);
        sort_for_apply(&mut patches);
        plan.patches = patches;
        plan
    }

    /// Execute a full apply run.
    pub fn run(&self, observer: &dyn ApplyObserver) -> ApplyRun {
        let started_at = Local::now();
        info!(
            patches_dir = %self.config.patches_dir.display(),
            critical_only = self.config.critical_only,
            "Starting apply run"
        );

        let preflight = self.preflight();
        let plan = self.plan(observer);
        let mut run = ApplyRun::new(started_at, preflight, &plan);

        if plan.discovered == 0 {
            error!(dir = %self.config.patches_dir.display(), "No patches found to apply");
            run.finished_at = Local::now();
            return run;
        }

        if plan.patches.is_empty() {
            info!("No patches left after filtering, nothing to apply");
            run.outcome = RunOutcome::CompletedAllApplied;
            run.finished_at = Local::now();
            return run;
        }

        observer.on_stage(RunStage::Backup);
        self.backup_stage(&mut run);

        observer.on_stage(RunStage::StopServices);
        run.services_stopped = Some(stop_services(&self.services, &self.config.services));
        self.settle(self.config.stop_settle, "stop");

        observer.on_stage(RunStage::ApplyEach);
        let total = plan.patches.len();
        for (i, patch) in plan.patches.iter().enumerate() {
            observer.on_patch_start(i + 1, total, patch);
            let record = self.apply_patch(patch, observer);
            observer.on_patch_done(&record);
            run.ledger.record(record);
        }

        observer.on_stage(RunStage::StartServices);
        run.services_started = Some(start_services(&self.services, &self.config.services));
        self.settle(self.config.start_settle, "start");

        observer.on_stage(RunStage::Verify);
        run.verification = Some(self.verify());

        run.outcome = if run.ledger.is_clean() {
            RunOutcome::CompletedAllApplied
        } else {
            RunOutcome::CompletedPartial
        };
        run.finished_at = Local::now();

        info!(
            applied = run.ledger.applied.len(),
            failed = run.ledger.failed.len(),
            outcome = %run.outcome,
            "Apply run finished"
        );
        run
    }

    fn backup_stage(&self, run: &mut ApplyRun) {
        if self.config.skip_backup {
            warn!("Backup skipped by configuration");
            run.backup = BackupStatus::Skipped;
            return;
        }

        match backup(&self.config.install_path, &self.config.backup_dir) {
            Ok(result) => {
                match prune_backups(&self.config.backup_dir, self.config.keep_backups) {
                    Ok(removed) => run.pruned = removed,
                    Err(warning) => {
                        warn!(%warning, "Backup pruning failed");
                        run.prune_warning = Some(warning);
                    }
                }
                run.backup = BackupStatus::Created(result);
            }
            Err(warning) => {
                warn!(%warning, "Backup failed, continuing without one");
                run.backup = BackupStatus::Failed(warning);
            }
        }
    }

    /// Apply every payload of one patch, continuing past failures.
    pub fn apply_patch(&self, patch: &StagedPatch, observer: &dyn ApplyObserver) -> ApplyRecord {
        info!(
            patch = %patch.name(),
            qfe = %patch.descriptor.qfe_display(),
            files = patch.payloads.len(),
            "Applying patch"
        );

        let mut attempts = Vec::with_capacity(patch.payloads.len());
        for payload in &patch.payloads {
            observer.on_file_start(payload);
            let started = Instant::now();
            let result = self.runner.run(payload, self.config.installer_timeout);
            let attempt = FileApplyAttempt::from_result(
                payload.path.clone(),
                payload.kind,
                result,
                started.elapsed(),
            );

            match &attempt.failure {
                None => info!(file = %attempt.file_name(), kind = %payload.kind, "Installed"),
                Some(failure) => error!(
                    file = %attempt.file_name(),
                    kind = %payload.kind,
                    error = %failure,
                    "Installer failed"
                ),
            }
            observer.on_file_done(&attempt);
            attempts.push(attempt);
        }

        let record = ApplyRecord::new(patch.descriptor.clone(), patch.dir.clone(), attempts);
        if record.success {
            info!(patch = %record.name(), "Patch applied");
        } else {
            error!(patch = %record.name(), "Patch failed");
        }
        record
    }

    fn verify(&self) -> Verification {
        let states = query_services(&self.services, &self.config.services);
        let running = count_running(&states);
        let bracketed = states.len();
        if running < bracketed {
            warn!(running, bracketed, "Not all services are running after apply");
        } else {
            info!(running, "All services running after apply");
        }

        let version_after = self.probe.product_version();
        Verification {
            running,
            bracketed,
            states,
            version_after,
        }
    }

    fn settle(&self, delay: Duration, action: &str) {
        if self.config.services.is_empty() || delay.is_zero() {
            return;
        }
        info!(secs = delay.as_secs(), action, "Waiting for services to settle");
        thread::sleep(delay);
    }
}

fn count_running(states: &[(String, ServiceState)]) -> usize {
    states
        .iter()
        .filter(|(_, state)| *state == ServiceState::Running)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::InstallerFailure;
    use crate::catalog::PatchCatalogEntry;
    use crate::install::ServiceControlWarning;
    use crate::staging::{staging_dir_name, write_descriptor, ScanLayout};
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Fails payloads whose name contains "fail", times out on "hang".
    #[derive(Default)]
    struct FakeRunner {
        calls: RefCell<Vec<String>>,
    }

    impl InstallerRunner for FakeRunner {
        fn run(&self, payload: &PayloadFile, timeout: Duration) -> Result<(), InstallerFailure> {
            let name = payload.file_name();
            self.calls.borrow_mut().push(name.clone());
            if name.contains("hang") {
                Err(InstallerFailure::TimedOut {
                    secs: timeout.as_secs(),
                })
            } else if name.contains("fail") {
                Err(InstallerFailure::NonZeroExit {
                    code: Some(1603),
                    output: String::new(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct FakeServices {
        calls: RefCell<Vec<String>>,
    }

    impl ServiceController for FakeServices {
        fn stop(&self, name: &str) -> Result<(), ServiceControlWarning> {
            self.calls.borrow_mut().push(format!("stop {}", name));
            Ok(())
        }

        fn start(&self, name: &str) -> Result<(), ServiceControlWarning> {
            self.calls.borrow_mut().push(format!("start {}", name));
            Ok(())
        }

        fn query(&self, _name: &str) -> ServiceState {
            ServiceState::Running
        }
    }

    struct FakeProbe;

    impl VersionProbe for FakeProbe {
        fn product_version(&self) -> Option<String> {
            Some("11.1".to_string())
        }
    }

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let install = temp.path().join("Server");
            fs::create_dir_all(&install).unwrap();
            fs::write(install.join("server.dll"), b"v1").unwrap();
            fs::create_dir_all(temp.path().join("staging")).unwrap();
            Self { temp }
        }

        fn stage(&self, name: &str, critical: &str, date: &str, files: &[&str]) {
            let dir = self.staging().join(staging_dir_name(name));
            fs::create_dir_all(&dir).unwrap();
            let mut entry = PatchCatalogEntry::new(name);
            entry.critical = critical.to_string();
            entry.release_date = date.to_string();
            write_descriptor(&dir, &entry).unwrap();
            for file in files {
                fs::write(dir.join(file), b"payload").unwrap();
            }
        }

        fn staging(&self) -> PathBuf {
            self.temp.path().join("staging")
        }

        fn config(&self) -> ApplyConfig {
            ApplyConfig::new(self.staging())
                .with_install_path(self.temp.path().join("Server"))
                .with_backup_dir(self.temp.path().join("backups"))
                .with_layout(ScanLayout::Flat)
                .with_services(vec!["ArcGIS Server".to_string()])
                .with_settle(Duration::ZERO, Duration::ZERO)
        }

        fn engine(&self, config: ApplyConfig) -> ApplyEngine<FakeRunner, FakeServices, FakeProbe> {
            ApplyEngine::new(config, FakeRunner::default(), FakeServices::default(), FakeProbe)
        }
    }

    fn staged(name: &str, critical: &str, date: &str) -> StagedPatch {
        let mut descriptor = PatchCatalogEntry::new(name);
        descriptor.critical = critical.to_string();
        descriptor.release_date = date.to_string();
        StagedPatch {
            dir: PathBuf::from(name),
            descriptor,
            payloads: vec![PayloadFile::from_path(Path::new(name).join("x.msp")).unwrap()],
        }
    }

    #[test]
    fn test_critical_first_then_by_date() {
        let fixture = Fixture::new();
        fixture.stage("Low Patch", "low", "2023-01-01", &["low.msp"]);
        fixture.stage("Critical Patch", "Critical", "2024-01-01", &["crit.msp"]);

        let engine = fixture.engine(fixture.config());
        let plan = engine.plan(&NoopApplyObserver);
        let names: Vec<_> = plan.patches.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Critical Patch", "Low Patch"]);
    }

    #[test]
    fn test_full_run_brackets_services_and_backs_up() {
        let fixture = Fixture::new();
        fixture.stage("A", "Security", "2024-01-01", &["a.msp", "a.exe"]);

        let engine = fixture.engine(fixture.config());
        let run = engine.run(&NoopApplyObserver);

        assert_eq!(run.outcome, RunOutcome::CompletedAllApplied);
        assert_eq!(run.exit_code(), 0);
        assert_eq!(run.ledger.applied.len(), 1);
        assert!(matches!(run.backup, BackupStatus::Created(_)));
        assert_eq!(
            *engine.services.calls.borrow(),
            vec!["stop ArcGIS Server", "start ArcGIS Server"]
        );
        assert_eq!(*engine.runner.calls.borrow(), vec!["a.msp", "a.exe"]);

        let verification = run.verification.unwrap();
        assert_eq!(verification.running, 1);
        assert_eq!(verification.version_after.as_deref(), Some("11.1"));
        assert_eq!(run.preflight.version.as_deref(), Some("11.1"));
    }

    #[test]
    fn test_partial_failure_isolated() {
        let fixture = Fixture::new();
        fixture.stage("A", "", "2024-01-01", &["a.msp"]);
        fixture.stage("B", "", "2024-02-01", &["b_fail.msp", "b_ok.exe"]);
        fixture.stage("C", "", "2024-03-01", &["c.msp"]);

        let engine = fixture.engine(fixture.config());
        let run = engine.run(&NoopApplyObserver);

        assert_eq!(run.outcome, RunOutcome::CompletedPartial);
        assert_eq!(run.exit_code(), 1);
        let applied: Vec<_> = run.ledger.applied.iter().map(|r| r.name()).collect();
        assert_eq!(applied, vec!["A", "C"]);
        assert_eq!(run.ledger.failed.len(), 1);
        assert_eq!(run.ledger.failed[0].attempts.len(), 2);
        assert_eq!(run.ledger.failed[0].attempts[0].exit_code, Some(1603));
        assert!(run.ledger.failed[0].attempts[1].succeeded());
    }

    #[test]
    fn test_no_patches_aborts() {
        let fixture = Fixture::new();
        fixture.stage("Empty", "", "", &["readme.txt"]);

        let engine = fixture.engine(fixture.config());
        let run = engine.run(&NoopApplyObserver);

        assert_eq!(run.outcome, RunOutcome::AbortedNoPatches);
        assert_eq!(run.exit_code(), 1);
        assert_eq!(run.skipped_empty, vec!["Empty".to_string()]);
        assert!(engine.services.calls.borrow().is_empty());
        assert_eq!(run.backup, BackupStatus::NotNeeded);
    }

    #[test]
    fn test_critical_only_filter_to_zero_skips_everything() {
        let fixture = Fixture::new();
        fixture.stage("Low", "low", "2024-01-01", &["low.msp"]);

        let config = fixture.config().with_critical_only(true);
        let engine = fixture.engine(config);
        let run = engine.run(&NoopApplyObserver);

        assert_eq!(run.outcome, RunOutcome::CompletedAllApplied);
        assert_eq!(run.filtered_out, vec!["Low".to_string()]);
        assert_eq!(run.ledger.total(), 0);
        assert_eq!(run.backup, BackupStatus::NotNeeded);
        assert!(engine.services.calls.borrow().is_empty());
        assert!(engine.runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_backup_failure_does_not_stop_run() {
        let fixture = Fixture::new();
        fixture.stage("A", "", "", &["a.msp"]);

        let config = fixture
            .config()
            .with_install_path(fixture.temp.path().join("missing"));
        let engine = fixture.engine(config);
        let run = engine.run(&NoopApplyObserver);

        assert!(matches!(
            run.backup,
            BackupStatus::Failed(BackupWarning::SourceMissing(_))
        ));
        assert!(!run.preflight.install_path_exists);
        assert_eq!(run.outcome, RunOutcome::CompletedAllApplied);
    }

    #[test]
    fn test_skip_backup() {
        let fixture = Fixture::new();
        fixture.stage("A", "", "", &["a.msp"]);

        let engine = fixture.engine(fixture.config().with_skip_backup(true));
        let run = engine.run(&NoopApplyObserver);
        assert_eq!(run.backup, BackupStatus::Skipped);
        assert!(!fixture.temp.path().join("backups").exists());
    }

    #[test]
    fn test_retain_critical() {
        let patches = vec![
            staged("a", "low", "1"),
            staged("b", "SECURITY", "2"),
            staged("c", "true", "3"),
        ];
        let (kept, dropped) = retain_critical(patches);
        let kept: Vec<_> = kept.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(kept, vec!["b", "c"]);
        assert_eq!(dropped, vec!["a".to_string()]);
    }

    #[test]
    fn test_observer_sees_stages_in_order() {
        #[derive(Default)]
        struct Recorder(RefCell<Vec<RunStage>>);

        impl ApplyObserver for Recorder {
            fn on_stage(&self, stage: RunStage) {
                self.0.borrow_mut().push(stage);
            }
        }

        let fixture = Fixture::new();
        fixture.stage("A", "", "", &["a.msp"]);
        let recorder = Recorder::default();
        fixture.engine(fixture.config()).run(&recorder);

        assert_eq!(
            *recorder.0.borrow(),
            vec![
                RunStage::Discover,
                RunStage::Sort,
                RunStage::Backup,
                RunStage::StopServices,
                RunStage::ApplyEach,
                RunStage::StartServices,
                RunStage::Verify,
            ]
        );
    }

    mod property_tests {
        use super::*;
        use crate::catalog::Criticality;
        use proptest::prelude::*;

        fn criticality() -> impl Strategy<Value = &'static str> {
            prop::sample::select(vec!["Critical", "security", "TRUE", "low", "", "false"])
        }

        fn date() -> impl Strategy<Value = &'static str> {
            prop::sample::select(vec!["2023-01-01", "2023-06-15", "2024-01-01"])
        }

        proptest! {
            #[test]
            fn sort_is_stable_and_ordered(
                raw in prop::collection::vec((criticality(), date()), 0..24)
            ) {
                let mut patches: Vec<StagedPatch> = raw
                    .iter()
                    .enumerate()
                    .map(|(i, (c, d))| staged(&i.to_string(), c, d))
                    .collect();
                sort_for_apply(&mut patches);

                prop_assert_eq!(patches.len(), raw.len());
                for pair in patches.windows(2) {
                    let (a, b) = (&pair[0].descriptor, &pair[1].descriptor);
                    let ka = apply_order_key(&a.critical, &a.release_date);
                    let kb = apply_order_key(&b.critical, &b.release_date);
                    prop_assert!(ka <= kb);
                    if ka == kb {
                        let ia: usize = a.name.parse().unwrap();
                        let ib: usize = b.name.parse().unwrap();
                        prop_assert!(ia < ib, "equal keys reordered");
                    }
                }

                let first_normal = patches
                    .iter()
                    .position(|p| p.descriptor.criticality() == Criticality::Normal)
                    .unwrap_or(patches.len());
                prop_assert!(patches[first_normal..]
                    .iter()
                    .all(|p| !p.descriptor.criticality().is_high()));
            }
        }
    }
}
