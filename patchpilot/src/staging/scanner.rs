//! Staging directory scanning.
//!
//! A staged patch is an immediate subdirectory of the staging directory that
//! holds a `patch_info.json` descriptor and at least one installer payload.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glob::{glob_with, MatchOptions, Pattern};
use tracing::{debug, info, warn};

use crate::catalog::PatchCatalogEntry;

use super::descriptor::read_descriptor;
use super::error::DiscoveryWarning;
use super::payload::{InstallerKind, PayloadFile};

/// Subfolder the download manager places Windows payloads in.
const NESTED_PAYLOAD_DIR: &str = "windows";

/// Where payloads are looked for inside a patch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanLayout {
    /// Directly inside the patch directory.
    Flat,
    /// Inside the `windows/` subfolder written by the download manager.
    Nested,
    /// Both locations; a file name found in both is taken once, flat first.
    #[default]
    Auto,
}

impl ScanLayout {
    fn search_dirs(&self, patch_dir: &Path) -> Vec<PathBuf> {
        let nested = patch_dir.join(NESTED_PAYLOAD_DIR);
        match self {
            Self::Flat => vec![patch_dir.to_path_buf()],
            Self::Nested => vec![nested],
            Self::Auto => vec![patch_dir.to_path_buf(), nested],
        }
    }
}

impl fmt::Display for ScanLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Nested => write!(f, "nested"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ScanLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "nested" => Ok(Self::Nested),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "invalid layout '{}': expected auto, flat or nested",
                other
            )),
        }
    }
}

/// A patch materialized on disk and ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPatch {
    /// The patch directory.
    pub dir: PathBuf,

    /// Parsed `patch_info.json`.
    pub descriptor: PatchCatalogEntry,

    /// Payloads in apply order: MSP files, then EXE files, each by name.
    pub payloads: Vec<PayloadFile>,
}

impl StagedPatch {
    /// Display name from the descriptor.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether the patch has anything to apply.
    pub fn is_applicable(&self) -> bool {
        !self.payloads.is_empty()
    }
}

/// Result of scanning a staging directory.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Applicable patches, sorted by directory name.
    pub patches: Vec<StagedPatch>,

    /// Names of patches whose descriptor was found but that have no payloads.
    pub skipped_empty: Vec<String>,

    /// Problems that caused a directory to be skipped.
    pub warnings: Vec<DiscoveryWarning>,
}

impl Inventory {
    /// Whether no applicable patch was found.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Scan `staging_dir` for staged patches.
///
/// Never fails: every problem becomes a [`DiscoveryWarning`] and the affected
/// directory is skipped.
pub fn scan(staging_dir: &Path, layout: ScanLayout) -> Inventory {
    let mut inventory = Inventory::default();

    if !staging_dir.is_dir() {
        let warning = DiscoveryWarning::MissingStagingDir(staging_dir.to_path_buf());
        warn!(%warning, "Nothing to scan");
        inventory.warnings.push(warning);
        return inventory;
    }

    let entries = match fs::read_dir(staging_dir) {
        Ok(entries) => entries,
        Err(e) => {
            let warning = DiscoveryWarning::UnreadableDirectory {
                path: staging_dir.to_path_buf(),
                reason: e.to_string(),
            };
            warn!(%warning, "Cannot scan staging directory");
            inventory.warnings.push(warning);
            return inventory;
        }
    };

    let mut patch_dirs: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .collect();
    patch_dirs.sort();

    for (dir_name, dir) in patch_dirs {
        let descriptor = match read_descriptor(&dir) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                debug!(dir = %dir_name, "No descriptor, not a staged patch");
                continue;
            }
            Err(warning) => {
                warn!(%warning, "Skipping patch directory");
                inventory.warnings.push(warning);
                continue;
            }
        };

        let payloads = collect_payloads(&dir, layout, &mut inventory.warnings);
        if payloads.is_empty() {
            info!(patch = %descriptor.name, dir = %dir_name, "No installer payloads, skipping");
            inventory.skipped_empty.push(descriptor.name);
            continue;
        }

        debug!(
            patch = %descriptor.name,
            payloads = payloads.len(),
            "Discovered staged patch"
        );
        inventory.patches.push(StagedPatch {
            dir,
            descriptor,
            payloads,
        });
    }

    info!(
        dir = %staging_dir.display(),
        layout = %layout,
        found = inventory.patches.len(),
        empty = inventory.skipped_empty.len(),
        warnings = inventory.warnings.len(),
        "Scanned staging directory"
    );

    inventory
}

/// Collect payloads for one patch directory in apply order.
fn collect_payloads(
    patch_dir: &Path,
    layout: ScanLayout,
    warnings: &mut Vec<DiscoveryWarning>,
) -> Vec<PayloadFile> {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut seen = HashSet::new();
    let mut payloads = Vec::new();

    for dir in layout.search_dirs(patch_dir) {
        if !dir.is_dir() {
            continue;
        }

        for kind in InstallerKind::ALL {
            let pattern = format!(
                "{}/*.{}",
                Pattern::escape(&dir.to_string_lossy()),
                kind.extension()
            );

            let paths = match glob_with(&pattern, options) {
                Ok(paths) => paths,
                Err(e) => {
                    warnings.push(DiscoveryWarning::UnreadableDirectory {
                        path: dir.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for path in paths.filter_map(Result::ok).filter(|p| p.is_file()) {
                if let Some(payload) = PayloadFile::from_path(path) {
                    if seen.insert(payload.file_name().to_lowercase()) {
                        payloads.push(payload);
                    }
                }
            }
        }
    }

    payloads.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
    payloads
}
