//! The `apply` command.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::ProgressBar;
use patchpilot::apply::{
    ApplyConfig, ApplyObserver, ApplyRecord, ApplyRun, BackupStatus, FileApplyAttempt, RunStage,
};
use patchpilot::report::write_apply_report;
use patchpilot::staging::{PayloadFile, StagedPatch};
use tracing::{error, info};

use super::common::{field, heading, system_engine, TargetArgs};
use crate::error::CliError;
use crate::progress::create_spinner;
use crate::Context;

/// Arguments for the `apply` command.
#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Root directory for install tree backups
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Seconds to wait for each installer before killing it
    #[arg(long, value_name = "SECS")]
    pub installer_timeout: Option<u64>,

    /// Do not back up the install tree first
    #[arg(long)]
    pub skip_backup: bool,

    /// Backups to keep after a new one is made (0 keeps all)
    #[arg(long)]
    pub keep_backups: Option<usize>,
}

impl ApplyArgs {
    /// Apply configuration from the config file with these flags on top.
    pub fn resolve(&self, ctx: &Context) -> ApplyConfig {
        let mut config = self.target.resolve(&ctx.config);
        if let Some(dir) = &self.backup_dir {
            config.backup_dir = dir.clone();
        }
        if let Some(secs) = self.installer_timeout {
            config.installer_timeout = Duration::from_secs(secs);
        }
        if let Some(keep) = self.keep_backups {
            config.keep_backups = keep;
        }
        config.skip_backup = self.skip_backup;
        config
    }
}

/// Spinner showing the current stage and installer, with a line per result.
struct ApplyProgress {
    spinner: ProgressBar,
}

impl ApplyObserver for ApplyProgress {
    fn on_stage(&self, stage: RunStage) {
        self.spinner.set_message(stage.to_string());
    }

    fn on_patch_start(&self, index: usize, total: usize, patch: &StagedPatch) {
        self.spinner.println(format!(
            "{} {} {}",
            style(format!("[{}/{}]", index, total)).dim(),
            style(patch.name()).bold(),
            style(format!("({})", patch.descriptor.criticality())).dim()
        ));
    }

    fn on_file_start(&self, payload: &PayloadFile) {
        self.spinner
            .set_message(format!("Installing {} ({})", payload.file_name(), payload.kind));
    }

    fn on_file_done(&self, attempt: &FileApplyAttempt) {
        match &attempt.failure {
            None => self.spinner.println(format!(
                "    {} {} ({:.1}s)",
                style("✓").green(),
                attempt.file_name(),
                attempt.elapsed.as_secs_f64()
            )),
            Some(failure) => self.spinner.println(format!(
                "    {} {}: {}",
                style("✗").red(),
                attempt.file_name(),
                failure
            )),
        }
    }

    fn on_patch_done(&self, record: &ApplyRecord) {
        if !record.success {
            self.spinner.println(format!(
                "    {}",
                style(format!("{} failed", record.name())).red()
            ));
        }
    }
}

/// Run the apply command.
pub fn run(args: ApplyArgs, ctx: &Context) -> Result<u8, CliError> {
    let config = args.resolve(ctx);
    let patches_dir = config.patches_dir.clone();
    let backup_dir = config.backup_dir.clone();

    heading("Patch Application");
    field("Patches directory", patches_dir.display());
    field("Install path", config.install_path.display());
    field("Backup directory", backup_dir.display());
    field("Layout", config.layout);
    field("Critical only", config.critical_only);

    let engine = system_engine(config, ctx.config.service_timeout());
    let progress = ApplyProgress {
        spinner: create_spinner("Starting"),
    };
    let run = engine.run(&progress);
    progress.spinner.finish_and_clear();

    print_outcome(&run);

    match write_apply_report(&run, &patches_dir, &backup_dir, &ctx.log_dir()) {
        Ok(Some(path)) => {
            info!(path = %path.display(), "Wrote apply report");
            field("Report", path.display());
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Cannot write apply report");
            eprintln!("Warning: could not write report: {}", e);
        }
    }

    // Outcome exit codes are 0 or 1.
    Ok(u8::try_from(run.exit_code()).unwrap_or(1))
}

fn print_outcome(run: &ApplyRun) {
    heading("Summary");
    field("Outcome", run.outcome);
    field("Discovered", run.discovered);
    if !run.filtered_out.is_empty() {
        field("Filtered out", run.filtered_out.len());
    }
    field("Applied", style(run.ledger.applied.len()).green());
    if run.ledger.failed.is_empty() {
        field("Failed", 0);
    } else {
        field("Failed", style(run.ledger.failed.len()).red());
        for record in &run.ledger.failed {
            println!("    {} {}", style("✗").red(), record.name());
        }
    }

    match &run.backup {
        BackupStatus::Created(result) => field("Backup", result.path.display()),
        BackupStatus::Skipped => field("Backup", style("skipped").yellow()),
        BackupStatus::Failed(warning) => field("Backup", style(warning).yellow()),
        BackupStatus::NotNeeded => {}
    }

    if let Some(verification) = &run.verification {
        field(
            "Services running",
            format!("{}/{}", verification.running, verification.bracketed),
        );
        if let Some(version) = &verification.version_after {
            field("Version", version);
        }
    }

    field("Duration", format!("{}s", run.duration().num_seconds()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use patchpilot::config::ConfigFile;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ApplyArgs,
    }

    fn parse(argv: &[&str]) -> ApplyArgs {
        let mut full = vec!["apply"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    fn context() -> Context {
        Context {
            config: ConfigFile::default(),
            config_path: PathBuf::from("config.ini"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "--backup-dir",
            "/backups",
            "--installer-timeout",
            "60",
            "--skip-backup",
            "--keep-backups",
            "3",
            "--layout",
            "nested",
        ]);

        let config = args.resolve(&context());
        assert_eq!(config.backup_dir, PathBuf::from("/backups"));
        assert_eq!(config.installer_timeout, Duration::from_secs(60));
        assert!(config.skip_backup);
        assert_eq!(config.keep_backups, 3);
        assert_eq!(config.layout, patchpilot::staging::ScanLayout::Nested);
    }

    #[test]
    fn test_defaults_come_from_config() {
        let ctx = context();
        let config = parse(&[]).resolve(&ctx);
        let expected = ctx.config.apply_config();

        assert_eq!(config.backup_dir, expected.backup_dir);
        assert_eq!(config.installer_timeout, expected.installer_timeout);
        assert!(!config.skip_backup);
    }
}
