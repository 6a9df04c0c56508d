//! Installer invocation.

use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::process::{run_with_timeout, ProcessError};
use crate::staging::PayloadFile;

/// Longest stderr excerpt kept in a failure.
const MAX_OUTPUT_EXCERPT: usize = 512;

/// Why one installer payload did not apply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstallerFailure {
    /// The installer ran and exited unsuccessfully. `code` is `None` when it
    /// was ended by a signal.
    #[error("installer exited with code {}: {output}", fmt_code(.code))]
    NonZeroExit { code: Option<i32>, output: String },

    /// The installer exceeded its timeout and was terminated.
    #[error("installer timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// The installer could not be started.
    #[error("failed to launch installer: {reason}")]
    LaunchFailed { reason: String },
}

impl InstallerFailure {
    /// Exit code, if the installer exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

/// Runs one installer payload to completion.
pub trait InstallerRunner {
    /// Apply `payload`, giving up after `timeout`.
    fn run(&self, payload: &PayloadFile, timeout: Duration) -> Result<(), InstallerFailure>;
}

/// Runs installers as silent, no-reboot external processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInstallerRunner;

impl InstallerRunner for ProcessInstallerRunner {
    fn run(&self, payload: &PayloadFile, timeout: Duration) -> Result<(), InstallerFailure> {
        let (program, args) = payload.kind.invocation(&payload.path);
        let mut command = Command::new(&program);
        command.args(&args);
        if let Some(dir) = payload.path.parent() {
            command.current_dir(dir);
        }

        debug!(program = ?program, args = ?args, "Launching installer");

        let output = run_with_timeout(command, timeout).map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => InstallerFailure::TimedOut {
                secs: timeout.as_secs(),
            },
            other => InstallerFailure::LaunchFailed {
                reason: other.to_string(),
            },
        })?;

        if output.success() {
            return Ok(());
        }

        let text = if output.stderr.trim().is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        Err(InstallerFailure::NonZeroExit {
            code: output.code,
            output: excerpt(text),
        })
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Trim and cap process output for recording.
fn excerpt(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_OUTPUT_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
