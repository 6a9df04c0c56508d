//! Service stop/start bracketing.
//!
//! Every service is controlled independently. A service that is missing,
//! refuses the request or does not answer in time produces a
//! [`ServiceControlWarning`]; nothing here aborts a run.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::process::{run_with_timeout, CommandOutput, ProcessError};

/// Services bracketed by default.
pub const DEFAULT_SERVICES: &[&str] = &[
    "ArcGIS Server",
    "ArcGIS Data Store",
    "Portal for ArcGIS",
];

/// Default bound on a single stop, start or query command.
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(60);

/// `sc` exit code for a service that does not exist.
const SC_ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

/// `systemctl` exit code for a unit that is not loaded.
const SYSTEMCTL_UNIT_NOT_FOUND: i32 = 5;

/// Last known state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    /// A start was issued successfully; the service may still be coming up.
    StartAttempted,
    Running,
    NotFound,
    /// The state could not be determined.
    Unknown,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::StartAttempted => write!(f, "start attempted"),
            Self::Running => write!(f, "running"),
            Self::NotFound => write!(f, "not found"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Start,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Start => write!(f, "start"),
        }
    }
}

/// A service that could not be controlled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceControlWarning {
    #[error("service '{service}' not found")]
    NotFound { service: String },

    #[error("could not {action} service '{service}': {reason}")]
    Failed {
        service: String,
        action: ServiceAction,
        reason: String,
    },

    #[error("timed out trying to {action} service '{service}' after {secs}s")]
    TimedOut {
        service: String,
        action: ServiceAction,
        secs: u64,
    },
}

impl ServiceControlWarning {
    /// State a service is left in after this warning.
    pub fn resulting_state(&self) -> ServiceState {
        match self {
            Self::NotFound { .. } => ServiceState::NotFound,
            _ => ServiceState::Unknown,
        }
    }
}

/// Controls named OS services.
pub trait ServiceController {
    fn stop(&self, name: &str) -> Result<(), ServiceControlWarning>;
    fn start(&self, name: &str) -> Result<(), ServiceControlWarning>;
    fn query(&self, name: &str) -> ServiceState;
}

/// Outcome of stopping or starting a set of services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceControlReport {
    pub action: ServiceAction,

    /// Services the action succeeded on, in request order.
    pub affected: Vec<String>,

    /// Per-service state after the action, in request order.
    pub states: Vec<(String, ServiceState)>,

    pub warnings: Vec<ServiceControlWarning>,
}

impl ServiceControlReport {
    fn new(action: ServiceAction) -> Self {
        Self {
            action,
            affected: Vec::new(),
            states: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Whether no service was affected at all.
    pub fn none_affected(&self) -> bool {
        self.affected.is_empty()
    }
}

/// Stop each named service.
pub fn stop_services<C: ServiceController + ?Sized>(
    controller: &C,
    names: &[String],
) -> ServiceControlReport {
    control(controller, names, ServiceAction::Stop)
}

/// Start each named service.
pub fn start_services<C: ServiceController + ?Sized>(
    controller: &C,
    names: &[String],
) -> ServiceControlReport {
    control(controller, names, ServiceAction::Start)
}

fn control<C: ServiceController + ?Sized>(
    controller: &C,
    names: &[String],
    action: ServiceAction,
) -> ServiceControlReport {
    let mut report = ServiceControlReport::new(action);

    for name in names {
        let result = match action {
            ServiceAction::Stop => controller.stop(name),
            ServiceAction::Start => controller.start(name),
        };

        match result {
            Ok(()) => {
                info!(service = %name, action = %action, "Service control succeeded");
                let state = match action {
                    ServiceAction::Stop => ServiceState::Stopped,
                    ServiceAction::Start => ServiceState::StartAttempted,
                };
                report.affected.push(name.clone());
                report.states.push((name.clone(), state));
            }
            Err(warning) => {
                warn!(%warning, "Service control failed");
                report.states.push((name.clone(), warning.resulting_state()));
                report.warnings.push(warning);
            }
        }
    }

    if report.none_affected() && !names.is_empty() {
        warn!(action = %action, "No services were affected");
    }
    report
}

/// Query the state of each named service.
pub fn query_services<C: ServiceController + ?Sized>(
    controller: &C,
    names: &[String],
) -> Vec<(String, ServiceState)> {
    names
        .iter()
        .map(|name| {
            let state = controller.query(name);
            info!(service = %name, state = %state, "Service state");
            (name.clone(), state)
        })
        .collect()
}

/// Controls services through the host's service manager.
///
/// Windows uses `net stop|start` and `sc query`; other platforms use
/// `systemctl stop|start|is-active` on a unit derived from the service name.
#[derive(Debug, Clone)]
pub struct SystemServiceController {
    timeout: Duration,
}

impl Default for SystemServiceController {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_TIMEOUT)
    }
}

impl SystemServiceController {
    /// Create a controller bounding each command by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn control(&self, name: &str, action: ServiceAction) -> Result<(), ServiceControlWarning> {
        let command = if cfg!(windows) {
            let mut cmd = Command::new("net");
            cmd.arg(action.to_string()).arg(name);
            cmd
        } else {
            let mut cmd = Command::new("systemctl");
            cmd.arg(action.to_string()).arg(unit_name(name));
            cmd
        };

        let output = self.run(name, action, command)?;
        if output.success() {
            return Ok(());
        }

        if is_not_found(&output) {
            return Err(ServiceControlWarning::NotFound {
                service: name.to_string(),
            });
        }

        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        Err(ServiceControlWarning::Failed {
            service: name.to_string(),
            action,
            reason: format!("exit code {:?}: {}", output.code, detail),
        })
    }

    fn run(
        &self,
        name: &str,
        action: ServiceAction,
        command: Command,
    ) -> Result<CommandOutput, ServiceControlWarning> {
        run_with_timeout(command, self.timeout).map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => ServiceControlWarning::TimedOut {
                service: name.to_string(),
                action,
                secs: timeout.as_secs(),
            },
            other => ServiceControlWarning::Failed {
                service: name.to_string(),
                action,
                reason: other.to_string(),
            },
        })
    }
}

impl ServiceController for SystemServiceController {
    fn stop(&self, name: &str) -> Result<(), ServiceControlWarning> {
        self.control(name, ServiceAction::Stop)
    }

    fn start(&self, name: &str) -> Result<(), ServiceControlWarning> {
        self.control(name, ServiceAction::Start)
    }

    fn query(&self, name: &str) -> ServiceState {
        let command = if cfg!(windows) {
            let mut cmd = Command::new("sc");
            cmd.arg("query").arg(name);
            cmd
        } else {
            let mut cmd = Command::new("systemctl");
            cmd.arg("is-active").arg(unit_name(name));
            cmd
        };

        match run_with_timeout(command, self.timeout) {
            Ok(output) if cfg!(windows) => parse_sc_query(&output),
            Ok(output) => parse_is_active(&output),
            Err(e) => {
                warn!(service = %name, error = %e, "Service query failed");
                ServiceState::Unknown
            }
        }
    }
}

/// systemd unit name for a service display name: lower-case, no spaces.
///
/// ```
/// use patchpilot::install::unit_name;
///
/// assert_eq!(unit_name("ArcGIS Server"), "arcgisserver");
/// ```
pub fn unit_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn is_not_found(output: &CommandOutput) -> bool {
    if cfg!(windows) {
        // net reports NET HELPMSG 2185 for an unknown service name
        output.stderr.contains("2185") || output.stdout.contains("2185")
    } else {
        output.code == Some(SYSTEMCTL_UNIT_NOT_FOUND)
    }
}

fn parse_sc_query(output: &CommandOutput) -> ServiceState {
    if output.code == Some(SC_ERROR_SERVICE_DOES_NOT_EXIST) {
        return ServiceState::NotFound;
    }
    if !output.success() {
        return ServiceState::Unknown;
    }
    if output.stdout.contains("RUNNING") {
        ServiceState::Running
    } else if output.stdout.contains("STOPPED") {
        ServiceState::Stopped
    } else {
        ServiceState::Unknown
    }
}

fn parse_is_active(output: &CommandOutput) -> ServiceState {
    match output.stdout.trim() {
        "active" | "reloading" => ServiceState::Running,
        "inactive" | "failed" | "deactivating" => ServiceState::Stopped,
        _ if output.code == Some(4) => ServiceState::NotFound,
        _ => ServiceState::Unknown,
    }
}
