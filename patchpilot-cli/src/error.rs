//! CLI error type.

use std::fmt;
use std::io;

use patchpilot::catalog::CatalogError;
use patchpilot::config::ConfigError;
use patchpilot::download::DownloadError;
use patchpilot::install::RestoreError;
use patchpilot::logging::LoggingError;

/// Errors that end a command.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or missing setting.
    Config(String),
    ConfigFile(ConfigError),
    Logging(LoggingError),
    Catalog(CatalogError),
    Download(DownloadError),
    Restore(RestoreError),
    Io(io::Error),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::ConfigFile(_) | Self::Logging(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            Self::Logging(e) => write!(f, "Logging setup failed: {}", e),
            Self::Catalog(e) => write!(f, "Catalog error: {}", e),
            Self::Download(e) => write!(f, "Download error: {}", e),
            Self::Restore(e) => write!(f, "Restore failed: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(_) => None,
            Self::ConfigFile(e) => Some(e),
            Self::Logging(e) => Some(e),
            Self::Catalog(e) => Some(e),
            Self::Download(e) => Some(e),
            Self::Restore(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        Self::Logging(e)
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        Self::Download(e)
    }
}

impl From<RestoreError> for CliError {
    fn from(e: RestoreError) -> Self {
        Self::Restore(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
