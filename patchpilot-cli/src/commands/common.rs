//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use console::style;
use patchpilot::apply::{ApplyConfig, ApplyEngine, ProcessInstallerRunner};
use patchpilot::catalog::PlatformFilter;
use patchpilot::config::ConfigFile;
use patchpilot::install::{RegistryVersionProbe, SystemServiceController};
use patchpilot::staging::ScanLayout;

/// Platform selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PlatformArg {
    /// Windows payloads only
    Windows,
    /// Linux payloads only
    Linux,
    /// Every platform
    Both,
}

impl From<PlatformArg> for PlatformFilter {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Windows => PlatformFilter::Windows,
            PlatformArg::Linux => PlatformFilter::Linux,
            PlatformArg::Both => PlatformFilter::Both,
        }
    }
}

/// Payload layout selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LayoutArg {
    /// Both the patch directory and its windows/ subfolder
    Auto,
    /// Directly in the patch directory
    Flat,
    /// In the windows/ subfolder written by `download`
    Nested,
}

impl From<LayoutArg> for ScanLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Auto => ScanLayout::Auto,
            LayoutArg::Flat => ScanLayout::Flat,
            LayoutArg::Nested => ScanLayout::Nested,
        }
    }
}

/// Arguments locating the staging directory and the installation.
#[derive(Debug, Clone, Args, Default)]
pub struct TargetArgs {
    /// Staging directory holding downloaded patches
    #[arg(long)]
    pub patches_dir: Option<PathBuf>,

    /// Installation directory to back up and patch
    #[arg(long)]
    pub install_path: Option<PathBuf>,

    /// Where to look for installers inside each patch directory
    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,

    /// Only apply critical and security patches
    #[arg(long)]
    pub critical_only: bool,
}

impl TargetArgs {
    /// Apply configuration from the config file with these flags on top.
    pub fn resolve(&self, config: &ConfigFile) -> ApplyConfig {
        let mut resolved = config.apply_config();
        if let Some(dir) = &self.patches_dir {
            resolved.patches_dir = dir.clone();
        }
        if let Some(path) = &self.install_path {
            resolved.install_path = path.clone();
        }
        if let Some(layout) = self.layout {
            resolved.layout = layout.into();
        }
        if self.critical_only {
            resolved.critical_only = true;
        }
        resolved
    }
}

/// Engine type used by the `apply` and `check` commands.
pub type SystemEngine =
    ApplyEngine<ProcessInstallerRunner, SystemServiceController, RegistryVersionProbe>;

/// Build an engine that drives real installers, services and the registry.
pub fn system_engine(apply: ApplyConfig, service_timeout: Duration) -> SystemEngine {
    ApplyEngine::new(
        apply,
        ProcessInstallerRunner,
        SystemServiceController::new(service_timeout),
        RegistryVersionProbe::default(),
    )
}

/// Print a section heading.
pub fn heading(title: &str) {
    println!();
    println!("{}", style(title).bold().cyan());
    println!("{}", style("=".repeat(title.len())).cyan());
}

/// Print an aligned `label: value` line.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<18} {}", format!("{}:", label), value);
}

/// Display a path, marking it when missing.
pub fn path_status(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} {}", path.display(), style("(missing)").yellow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_enum_conversions() {
        assert_eq!(PlatformFilter::from(PlatformArg::Both), PlatformFilter::Both);
        assert_eq!(ScanLayout::from(LayoutArg::Nested), ScanLayout::Nested);
    }

    #[test]
    fn test_target_args_override_config() {
        let config = ConfigFile::default();
        let args = TargetArgs {
            patches_dir: Some(PathBuf::from("/staging")),
            install_path: None,
            layout: Some(LayoutArg::Flat),
            critical_only: true,
        };

        let resolved = args.resolve(&config);
        assert_eq!(resolved.patches_dir, PathBuf::from("/staging"));
        assert_eq!(resolved.install_path, config.apply.install_path);
        assert_eq!(resolved.layout, ScanLayout::Flat);
        assert!(resolved.critical_only);
    }

    #[test]
    fn test_target_args_default_to_config() {
        let mut config = ConfigFile::default();
        config.apply.critical_only = true;
        let resolved = TargetArgs::default().resolve(&config);
        assert!(resolved.critical_only);
        assert_eq!(resolved.patches_dir, config.download.output_dir);
    }
}
