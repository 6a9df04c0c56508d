//! Configuration for the apply engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::download::DEFAULT_OUTPUT_DIR;
use crate::install::DEFAULT_SERVICES;
use crate::staging::ScanLayout;

/// Default install tree that is backed up before patching.
pub const DEFAULT_INSTALL_PATH: &str = r"C:\Program Files\ArcGIS\Server";

/// Default root for install backups.
pub const DEFAULT_BACKUP_DIR: &str = "./backups";

/// Default hard timeout for one installer invocation.
pub const DEFAULT_INSTALLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Default wait after stopping services, to let file locks release.
pub const DEFAULT_STOP_SETTLE: Duration = Duration::from_secs(10);

/// Default wait after starting services, before verification.
pub const DEFAULT_START_SETTLE: Duration = Duration::from_secs(30);

/// Configuration for an apply run.
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    /// Staging directory to scan for patches.
    pub patches_dir: PathBuf,

    /// Install tree to back up.
    pub install_path: PathBuf,

    /// Root directory for backups.
    pub backup_dir: PathBuf,

    /// Where payloads are looked for inside each patch directory.
    pub layout: ScanLayout,

    /// Only apply high-priority patches.
    pub critical_only: bool,

    /// Skip the install tree backup.
    pub skip_backup: bool,

    /// Backups to keep after a successful backup (0 keeps all).
    pub keep_backups: usize,

    /// Services stopped before and started after applying.
    pub services: Vec<String>,

    pub installer_timeout: Duration,
    pub stop_settle: Duration,
    pub start_settle: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            patches_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            install_path: PathBuf::from(DEFAULT_INSTALL_PATH),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            layout: ScanLayout::Auto,
            critical_only: false,
            skip_backup: false,
            keep_backups: 0,
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            installer_timeout: DEFAULT_INSTALLER_TIMEOUT,
            stop_settle: DEFAULT_STOP_SETTLE,
            start_settle: DEFAULT_START_SETTLE,
        }
    }
}

impl ApplyConfig {
    /// Create a configuration scanning `patches_dir`.
    pub fn new(patches_dir: impl Into<PathBuf>) -> Self {
        Self {
            patches_dir: patches_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = path.into();
        self
    }

    pub fn with_backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_dir = path.into();
        self
    }

    pub fn with_layout(mut self, layout: ScanLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_critical_only(mut self, critical_only: bool) -> Self {
        self.critical_only = critical_only;
        self
    }

    pub fn with_skip_backup(mut self, skip: bool) -> Self {
        self.skip_backup = skip;
        self
    }

    pub fn with_keep_backups(mut self, keep: usize) -> Self {
        self.keep_backups = keep;
        self
    }

    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    pub fn with_installer_timeout(mut self, timeout: Duration) -> Self {
        self.installer_timeout = timeout;
        self
    }

    /// Set both settle delays.
    pub fn with_settle(mut self, after_stop: Duration, after_start: Duration) -> Self {
        self.stop_settle = after_stop;
        self.start_settle = after_start;
        self
    }
}
