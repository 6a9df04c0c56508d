//! Installed product version probing.

use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::process::run_with_timeout;

/// Registry key holding the installed server version.
pub const DEFAULT_REGISTRY_KEY: &str = r"HKLM\SOFTWARE\ESRI\ArcGIS Server\Server";

/// Registry value name holding the version string.
pub const DEFAULT_REGISTRY_VALUE: &str = "Version";

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Reports the installed product version, when it can be determined.
pub trait VersionProbe {
    fn product_version(&self) -> Option<String>;
}

/// Reads the version from the Windows registry via `reg query`.
///
/// Always returns `None` on other platforms.
#[derive(Debug, Clone)]
pub struct RegistryVersionProbe {
    key: String,
    value: String,
}

impl Default for RegistryVersionProbe {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_KEY, DEFAULT_REGISTRY_VALUE)
    }
}

impl RegistryVersionProbe {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl VersionProbe for RegistryVersionProbe {
    fn product_version(&self) -> Option<String> {
        if !cfg!(windows) {
            debug!("Registry version probe unavailable on this platform");
            return None;
        }

        let mut command = Command::new("reg");
        command.args(["query", &self.key, "/v", &self.value]);

        let version = match run_with_timeout(command, QUERY_TIMEOUT) {
            Ok(output) if output.success() => parse_reg_query(&output.stdout, &self.value),
            Ok(output) => {
                debug!(code = ?output.code, "reg query returned non-zero");
                None
            }
            Err(e) => {
                debug!(error = %e, "reg query failed");
                None
            }
        };

        match &version {
            Some(v) => info!(version = %v, "Installed product version"),
            None => warn!(key = %self.key, "Could not determine installed product version"),
        }
        version
    }
}

/// Extract a value's data from `reg query` output.
///
/// Matches lines of the form `    <name>    REG_SZ    <data>`.
pub fn parse_reg_query(stdout: &str, value_name: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(value_name)?;
        let (kind, data) = rest.trim_start().split_once(char::is_whitespace)?;
        if !kind.starts_with("REG_") {
            return None;
        }
        let data = data.trim();
        (!data.is_empty()).then(|| data.to_string())
    })
}
