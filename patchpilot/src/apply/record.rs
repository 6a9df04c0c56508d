//! Apply outcome records.

use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::PatchCatalogEntry;
use crate::staging::InstallerKind;

use super::runner::InstallerFailure;

/// One installer payload invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileApplyAttempt {
    pub file: PathBuf,
    pub kind: InstallerKind,
    /// `Some(0)` on success, the installer's code on a non-zero exit, `None`
    /// if it never exited on its own.
    pub exit_code: Option<i32>,
    pub failure: Option<InstallerFailure>,
    pub elapsed: Duration,
}

impl FileApplyAttempt {
    /// Build an attempt from the runner's result.
    pub fn from_result(
        file: PathBuf,
        kind: InstallerKind,
        result: Result<(), InstallerFailure>,
        elapsed: Duration,
    ) -> Self {
        let (exit_code, failure) = match result {
            Ok(()) => (Some(0), None),
            Err(failure) => (failure.exit_code(), Some(failure)),
        };
        Self {
            file,
            kind,
            exit_code,
            failure,
            elapsed,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// File name component as text.
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of applying one staged patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRecord {
    pub descriptor: PatchCatalogEntry,
    pub patch_dir: PathBuf,
    /// Every payload invocation, in apply order.
    pub attempts: Vec<FileApplyAttempt>,
    /// True only if every attempt succeeded.
    pub success: bool,
}

impl ApplyRecord {
    /// Build a record; success is derived from the attempts.
    pub fn new(
        descriptor: PatchCatalogEntry,
        patch_dir: PathBuf,
        attempts: Vec<FileApplyAttempt>,
    ) -> Self {
        let success = !attempts.is_empty() && attempts.iter().all(FileApplyAttempt::succeeded);
        Self {
            descriptor,
            patch_dir,
            attempts,
            success,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The first failed attempt, which is what marked the patch failed.
    pub fn first_failure(&self) -> Option<&FileApplyAttempt> {
        self.attempts.iter().find(|a| !a.succeeded())
    }

    pub fn failed_attempts(&self) -> impl Iterator<Item = &FileApplyAttempt> {
        self.attempts.iter().filter(|a| !a.succeeded())
    }
}

/// Applied and failed patches of one run, each in apply order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyLedger {
    pub applied: Vec<ApplyRecord>,
    pub failed: Vec<ApplyRecord>,
}

impl ApplyLedger {
    /// File a record under `applied` or `failed`.
    pub fn record(&mut self, record: ApplyRecord) {
        if record.success {
            self.applied.push(record);
        } else {
            self.failed.push(record);
        }
    }

    pub fn total(&self) -> usize {
        self.applied.len() + self.failed.len()
    }

    /// Whether no patch failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(name: &str, result: Result<(), InstallerFailure>) -> FileApplyAttempt {
        FileApplyAttempt::from_result(
            PathBuf::from(name),
            InstallerKind::Msp,
            result,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_attempt_exit_codes() {
        assert_eq!(attempt("a.msp", Ok(())).exit_code, Some(0));

        let failed = attempt(
            "b.msp",
            Err(InstallerFailure::NonZeroExit {
                code: Some(1603),
                output: String::new(),
            }),
        );
        assert_eq!(failed.exit_code, Some(1603));
        assert!(!failed.succeeded());

        let timed_out = attempt("c.msp", Err(InstallerFailure::TimedOut { secs: 1 }));
        assert_eq!(timed_out.exit_code, None);
    }

    #[test]
    fn test_first_failure_marks_patch_failed() {
        let record = ApplyRecord::new(
            PatchCatalogEntry::new("A"),
            PathBuf::from("A"),
            vec![
                attempt("1.msp", Err(InstallerFailure::TimedOut { secs: 1 })),
                attempt("2.msp", Ok(())),
            ],
        );
        assert!(!record.success);
        assert_eq!(record.first_failure().unwrap().file_name(), "1.msp");
        assert_eq!(record.failed_attempts().count(), 1);
    }

    #[test]
    fn test_ledger_routing() {
        let mut ledger = ApplyLedger::default();
        ledger.record(ApplyRecord::new(
            PatchCatalogEntry::new("ok"),
            PathBuf::from("ok"),
            vec![attempt("a.msp", Ok(()))],
        ));
        ledger.record(ApplyRecord::new(
            PatchCatalogEntry::new("bad"),
            PathBuf::from("bad"),
            vec![attempt(
                "b.msp",
                Err(InstallerFailure::LaunchFailed {
                    reason: "x".to_string(),
                }),
            )],
        ));

        assert_eq!(ledger.total(), 2);
        assert_eq!(ledger.applied[0].name(), "ok");
        assert_eq!(ledger.failed[0].name(), "bad");
        assert!(!ledger.is_clean());
    }
}
