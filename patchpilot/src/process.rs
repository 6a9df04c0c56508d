//! External process execution with a hard wall-clock timeout.
//!
//! Children are spawned in their own process group on Unix so that a timeout
//! can terminate the whole tree an installer may have started. On Windows the
//! tree is terminated with `taskkill /T /F`. A process that exits while
//! something it started still holds its output pipes gets the same treatment
//! once the deadline passes.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period between SIGTERM and SIGKILL on Unix.
#[cfg(unix)]
const TERM_GRACE: Duration = Duration::from_millis(200);

/// How long to wait for leftover output once lingering processes are killed.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Errors from running an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch { program: String, source: io::Error },

    /// The process ran past its timeout and was terminated.
    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    /// Waiting on the process failed.
    #[error("failed to wait for {program}: {source}")]
    Wait { program: String, source: io::Error },
}

/// Captured result of a process that exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was ended by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `command` to completion, killing it if it outlives `timeout`.
///
/// Stdin is closed; stdout and stderr are captured. The timeout also bounds
/// reading the output, so a background process that inherited the pipes
/// cannot hold the call open. A timeout too large to represent means no
/// deadline.
pub fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<CommandOutput, ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| ProcessError::Launch {
        program: program.clone(),
        source: e,
    })?;
    debug!(program = %program, pid = child.id(), "Spawned process");

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let deadline = started.checked_add(timeout);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(ProcessError::Wait { program, source: e });
            }
        }

        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            warn!(
                program = %program,
                pid = child.id(),
                timeout_secs = timeout.as_secs(),
                "Process timed out, terminating"
            );
            terminate(&mut child);
            // Readers are left detached; orphaned grandchildren may still hold the pipes.
            return Err(ProcessError::TimedOut { program, timeout });
        }
        let pause = deadline.map_or(POLL_INTERVAL, |deadline| POLL_INTERVAL.min(deadline - now));
        thread::sleep(pause);
    };

    let mut stdout = collect(stdout_reader.as_ref(), deadline);
    let mut stderr = collect(stderr_reader.as_ref(), deadline);

    if stdout.is_none() || stderr.is_none() {
        warn!(
            program = %program,
            pid = child.id(),
            "Process exited but left its output open past the deadline, terminating leftovers"
        );
        if let Err(e) = kill_process_tree(child.id()) {
            debug!(pid = child.id(), error = %e, "Could not terminate leftover processes");
        }
        let grace = Instant::now().checked_add(READER_GRACE);
        if stdout.is_none() {
            stdout = collect(stdout_reader.as_ref(), grace);
        }
        if stderr.is_none() {
            stderr = collect(stderr_reader.as_ref(), grace);
        }
    }

    Ok(CommandOutput {
        code: status.code(),
        stdout: stdout.unwrap_or_default(),
        stderr: stderr.unwrap_or_default(),
        elapsed: started.elapsed(),
    })
}

/// Read a pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    Some(rx)
}

/// Wait for a reader's output until `deadline`.
///
/// `None` means the pipe was still open when the deadline passed.
fn collect(reader: Option<&Receiver<String>>, deadline: Option<Instant>) -> Option<String> {
    let Some(reader) = reader else {
        return Some(String::new());
    };
    let received = match deadline {
        Some(deadline) => reader.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        None => reader.recv().map_err(RecvTimeoutError::from),
    };
    match received {
        Ok(output) => Some(output),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
    }
}

/// Kill the child's whole tree and reap it.
fn terminate(child: &mut Child) {
    if let Err(e) = kill_process_tree(child.id()) {
        debug!(pid = child.id(), error = %e, "Process tree kill failed, killing child only");
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_tree(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    for (signal, pause) in [(libc::SIGTERM, TERM_GRACE), (libc::SIGKILL, Duration::ZERO)] {
        // SAFETY: killpg only sends a signal; the group was created at spawn.
        let rc = unsafe { libc::killpg(pgid, signal) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        thread::sleep(pause);
    }
    Ok(())
}

#[cfg(windows)]
fn kill_process_tree(pid: u32) -> io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "taskkill failed for pid {} (exit {:?})",
            pid,
            status.code()
        )))
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_process_tree(_pid: u32) -> io::Result<()> {
    Ok(())
}
