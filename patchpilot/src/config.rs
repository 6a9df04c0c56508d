//! Configuration file.
//!
//! Settings live in an INI file, by default `<config dir>/patchpilot/config.ini`:
//!
//! ```ini
//! [catalog]
//! path = patches.json
//! product_version = 11.1
//! product_families = ArcGIS Server, ArcGIS Enterprise
//!
//! [download]
//! output_dir = ./arcgis_server_11_1_patches
//! platform = both
//!
//! [apply]
//! install_path = C:\Program Files\ArcGIS\Server
//! services = ArcGIS Server, ArcGIS Data Store, Portal for ArcGIS
//!
//! [logging]
//! level = info
//! ```
//!
//! Missing keys take their defaults. Command-line flags override the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{EscapePolicy, Ini, ParseOption};
use thiserror::Error;

use crate::apply::{
    ApplyConfig, DEFAULT_BACKUP_DIR, DEFAULT_INSTALLER_TIMEOUT, DEFAULT_INSTALL_PATH,
    DEFAULT_START_SETTLE, DEFAULT_STOP_SETTLE,
};
use crate::catalog::{
    PlatformFilter, ProductSelector, DEFAULT_PRODUCT_FAMILIES, DEFAULT_PRODUCT_VERSION,
};
use crate::download::{DownloadConfig, DEFAULT_OUTPUT_DIR, DEFAULT_THROTTLE, DEFAULT_TIMEOUT_SECS};
use crate::install::{DEFAULT_SERVICES, DEFAULT_SERVICE_TIMEOUT};
use crate::logging::{LoggingConfig, DEFAULT_LOG_DIR, DEFAULT_LOG_LEVEL};
use crate::staging::ScanLayout;

/// Default catalog document path.
pub const DEFAULT_CATALOG_PATH: &str = "patches.json";

/// Errors from reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Path of the user's configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchpilot")
        .join("config.ini")
}

/// `[catalog]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSettings {
    pub path: PathBuf,
    pub product_version: String,
    pub product_families: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CATALOG_PATH),
            product_version: DEFAULT_PRODUCT_VERSION.to_string(),
            product_families: DEFAULT_PRODUCT_FAMILIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub output_dir: PathBuf,
    pub platform: PlatformFilter,
    pub throttle_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            platform: PlatformFilter::default(),
            throttle_ms: DEFAULT_THROTTLE.as_millis() as u64,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[apply]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplySettings {
    /// Staging directory to apply from; the download output dir when unset.
    pub patches_dir: Option<PathBuf>,
    pub install_path: PathBuf,
    pub backup_dir: PathBuf,
    pub layout: ScanLayout,
    pub critical_only: bool,
    pub services: Vec<String>,
    pub installer_timeout_secs: u64,
    pub service_timeout_secs: u64,
    pub stop_settle_secs: u64,
    pub start_settle_secs: u64,
    pub keep_backups: usize,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            patches_dir: None,
            install_path: PathBuf::from(DEFAULT_INSTALL_PATH),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            layout: ScanLayout::default(),
            critical_only: false,
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            installer_timeout_secs: DEFAULT_INSTALLER_TIMEOUT.as_secs(),
            service_timeout_secs: DEFAULT_SERVICE_TIMEOUT.as_secs(),
            stop_settle_secs: DEFAULT_STOP_SETTLE.as_secs(),
            start_settle_secs: DEFAULT_START_SETTLE.as_secs(),
            keep_backups: 0,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub log_dir: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub catalog: CatalogSettings,
    pub download: DownloadSettings,
    pub apply: ApplySettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default path. A missing file yields the defaults.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        // Windows paths are stored verbatim, so backslashes are not escapes
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_file_opt(path, options).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default path.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file_policy(path, EscapePolicy::Nothing)
            .map_err(write_err)
    }

    /// Product selector from the `[catalog]` section.
    pub fn product_selector(&self) -> ProductSelector {
        ProductSelector::new(
            self.catalog.product_version.clone(),
            self.catalog.product_families.clone(),
        )
    }

    /// Download configuration from the file's settings.
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::new(self.download.output_dir.clone())
            .with_selector(self.product_selector())
            .with_platform(self.download.platform)
            .with_throttle(Duration::from_millis(self.download.throttle_ms))
            .with_request_timeout(Duration::from_secs(self.download.request_timeout_secs))
    }

    /// Apply configuration from the file's settings.
    pub fn apply_config(&self) -> ApplyConfig {
        let patches_dir = self
            .apply
            .patches_dir
            .clone()
            .unwrap_or_else(|| self.download.output_dir.clone());

        ApplyConfig::new(patches_dir)
            .with_install_path(self.apply.install_path.clone())
            .with_backup_dir(self.apply.backup_dir.clone())
            .with_layout(self.apply.layout)
            .with_critical_only(self.apply.critical_only)
            .with_keep_backups(self.apply.keep_backups)
            .with_services(self.apply.services.clone())
            .with_installer_timeout(Duration::from_secs(self.apply.installer_timeout_secs))
            .with_settle(
                Duration::from_secs(self.apply.stop_settle_secs),
                Duration::from_secs(self.apply.start_settle_secs),
            )
    }

    /// Service command timeout from the `[apply]` section.
    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.apply.service_timeout_secs)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::new(self.logging.log_dir.clone(), self.logging.level.clone())
    }
}

/// Every setting, addressable as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    CatalogPath,
    CatalogProductVersion,
    CatalogProductFamilies,
    DownloadOutputDir,
    DownloadPlatform,
    DownloadThrottleMs,
    DownloadRequestTimeoutSecs,
    ApplyPatchesDir,
    ApplyInstallPath,
    ApplyBackupDir,
    ApplyLayout,
    ApplyCriticalOnly,
    ApplyServices,
    ApplyInstallerTimeoutSecs,
    ApplyServiceTimeoutSecs,
    ApplyStopSettleSecs,
    ApplyStartSettleSecs,
    ApplyKeepBackups,
    LoggingLevel,
    LoggingLogDir,
}

impl ConfigKey {
    /// All keys, in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            CatalogPath,
            CatalogProductVersion,
            CatalogProductFamilies,
            DownloadOutputDir,
            DownloadPlatform,
            DownloadThrottleMs,
            DownloadRequestTimeoutSecs,
            ApplyPatchesDir,
            ApplyInstallPath,
            ApplyBackupDir,
            ApplyLayout,
            ApplyCriticalOnly,
            ApplyServices,
            ApplyInstallerTimeoutSecs,
            ApplyServiceTimeoutSecs,
            ApplyStopSettleSecs,
            ApplyStartSettleSecs,
            ApplyKeepBackups,
            LoggingLevel,
            LoggingLogDir,
        ]
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            CatalogPath | CatalogProductVersion | CatalogProductFamilies => "catalog",
            DownloadOutputDir | DownloadPlatform | DownloadThrottleMs
            | DownloadRequestTimeoutSecs => "download",
            LoggingLevel | LoggingLogDir => "logging",
            _ => "apply",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            CatalogPath => "path",
            CatalogProductVersion => "product_version",
            CatalogProductFamilies => "product_families",
            DownloadOutputDir => "output_dir",
            DownloadPlatform => "platform",
            DownloadThrottleMs => "throttle_ms",
            DownloadRequestTimeoutSecs => "request_timeout_secs",
            ApplyPatchesDir => "patches_dir",
            ApplyInstallPath => "install_path",
            ApplyBackupDir => "backup_dir",
            ApplyLayout => "layout",
            ApplyCriticalOnly => "critical_only",
            ApplyServices => "services",
            ApplyInstallerTimeoutSecs => "installer_timeout_secs",
            ApplyServiceTimeoutSecs => "service_timeout_secs",
            ApplyStopSettleSecs => "stop_settle_secs",
            ApplyStartSettleSecs => "start_settle_secs",
            ApplyKeepBackups => "keep_backups",
            LoggingLevel => "level",
            LoggingLogDir => "log_dir",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as it would be written to the file.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            CatalogPath => path_str(&config.catalog.path),
            CatalogProductVersion => config.catalog.product_version.clone(),
            CatalogProductFamilies => config.catalog.product_families.join(", "),
            DownloadOutputDir => path_str(&config.download.output_dir),
            DownloadPlatform => config.download.platform.to_string(),
            DownloadThrottleMs => config.download.throttle_ms.to_string(),
            DownloadRequestTimeoutSecs => config.download.request_timeout_secs.to_string(),
            ApplyPatchesDir => config
                .apply
                .patches_dir
                .as_deref()
                .map(path_str)
                .unwrap_or_default(),
            ApplyInstallPath => path_str(&config.apply.install_path),
            ApplyBackupDir => path_str(&config.apply.backup_dir),
            ApplyLayout => config.apply.layout.to_string(),
            ApplyCriticalOnly => config.apply.critical_only.to_string(),
            ApplyServices => config.apply.services.join(", "),
            ApplyInstallerTimeoutSecs => config.apply.installer_timeout_secs.to_string(),
            ApplyServiceTimeoutSecs => config.apply.service_timeout_secs.to_string(),
            ApplyStopSettleSecs => config.apply.stop_settle_secs.to_string(),
            ApplyStartSettleSecs => config.apply.start_settle_secs.to_string(),
            ApplyKeepBackups => config.apply.keep_backups.to_string(),
            LoggingLevel => config.logging.level.clone(),
            LoggingLogDir => path_str(&config.logging.log_dir),
        }
    }

    /// Parse `value` and store it in `config`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> ConfigResult<()> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            CatalogPath => config.catalog.path = PathBuf::from(value),
            CatalogProductVersion => config.catalog.product_version = value.to_string(),
            CatalogProductFamilies => config.catalog.product_families = split_list(value),
            DownloadOutputDir => config.download.output_dir = PathBuf::from(value),
            DownloadPlatform => config.download.platform = self.parse(value)?,
            DownloadThrottleMs => config.download.throttle_ms = self.parse(value)?,
            DownloadRequestTimeoutSecs => {
                config.download.request_timeout_secs = self.parse(value)?
            }
            ApplyPatchesDir => {
                config.apply.patches_dir = (!value.is_empty()).then(|| PathBuf::from(value))
            }
            ApplyInstallPath => config.apply.install_path = PathBuf::from(value),
            ApplyBackupDir => config.apply.backup_dir = PathBuf::from(value),
            ApplyLayout => config.apply.layout = self.parse(value)?,
            ApplyCriticalOnly => config.apply.critical_only = self.parse(value)?,
            ApplyServices => config.apply.services = split_list(value),
            ApplyInstallerTimeoutSecs => config.apply.installer_timeout_secs = self.parse(value)?,
            ApplyServiceTimeoutSecs => config.apply.service_timeout_secs = self.parse(value)?,
            ApplyStopSettleSecs => config.apply.stop_settle_secs = self.parse(value)?,
            ApplyStartSettleSecs => config.apply.start_settle_secs = self.parse(value)?,
            ApplyKeepBackups => config.apply.keep_backups = self.parse(value)?,
            LoggingLevel => config.logging.level = value.to_string(),
            LoggingLogDir => config.logging.log_dir = PathBuf::from(value),
        }
        Ok(())
    }

    fn parse<T>(&self, value: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: e.to_string(),
        })
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Comma-separated list, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("none.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.catalog.product_version, "11.1");
        assert_eq!(config.apply.services.len(), 3);
    }

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(
            &path,
            "[download]\nplatform = windows\nthrottle_ms = 0\n\n[apply]\nservices = A, B\nlayout = nested\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.download.platform, PlatformFilter::Windows);
        assert_eq!(config.download.throttle_ms, 0);
        assert_eq!(config.apply.services, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(config.apply.layout, ScanLayout::Nested);
        assert_eq!(config.catalog, CatalogSettings::default());
    }

    #[test]
    fn test_invalid_value_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[apply]\nkeep_backups = many\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "apply.keep_backups"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.ini");

        let mut config = ConfigFile::default();
        config.apply.patches_dir = Some(PathBuf::from("/srv/staging"));
        config.apply.critical_only = true;
        config.catalog.product_families = vec!["ArcGIS Server".to_string()];
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_windows_paths_keep_backslashes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        let content = "[apply]\ninstall_path = C:\\Program Files\\ArcGIS\\Server\n";
        std::fs::write(&path, content).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        let expected = PathBuf::from(r"C:\Program Files\ArcGIS\Server");
        assert_eq!(loaded.apply.install_path, expected);

        loaded.save_to(&path).unwrap();
        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded.apply.install_path, expected);
    }

    #[test]
    fn test_apply_config_falls_back_to_output_dir() {
        let mut config = ConfigFile::default();
        config.download.output_dir = PathBuf::from("/data/patches");
        assert_eq!(config.apply_config().patches_dir, PathBuf::from("/data/patches"));

        config.apply.patches_dir = Some(PathBuf::from("/other"));
        assert_eq!(config.apply_config().patches_dir, PathBuf::from("/other"));
    }

    #[test]
    fn test_download_config_from_settings() {
        let mut config = ConfigFile::default();
        config.download.throttle_ms = 250;
        config.catalog.product_version = "11.3".to_string();

        let download = config.download_config();
        assert_eq!(download.throttle, Duration::from_millis(250));
        assert_eq!(download.selector.version, "11.3");
    }

    #[test]
    fn test_config_key_names() {
        let key: ConfigKey = "apply.install_path".parse().unwrap();
        assert_eq!(key, ConfigKey::ApplyInstallPath);
        assert_eq!(key.to_string(), "apply.install_path");
        assert!("apply.nope".parse::<ConfigKey>().is_err());

        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ConfigFile::default();
        ConfigKey::ApplyKeepBackups.set(&mut config, "5").unwrap();
        assert_eq!(ConfigKey::ApplyKeepBackups.get(&config), "5");

        ConfigKey::ApplyPatchesDir.set(&mut config, "").unwrap();
        assert_eq!(config.apply.patches_dir, None);
    }
}
