//! Installer payload kinds and platform classification.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// The kind of installer a payload file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstallerKind {
    /// Incremental update package applied through `msiexec /p`.
    Msp,
    /// Self-contained installer executable.
    Exe,
}

impl InstallerKind {
    /// All kinds, in the order they are applied within a patch.
    pub const ALL: [InstallerKind; 2] = [InstallerKind::Msp, InstallerKind::Exe];

    /// Detect the kind from a file's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "msp" => Some(Self::Msp),
            "exe" => Some(Self::Exe),
            _ => None,
        }
    }

    /// Lower-case file extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Msp => "msp",
            Self::Exe => "exe",
        }
    }

    /// Program and arguments for a silent, no-reboot install of `file`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use patchpilot::staging::InstallerKind;
    ///
    /// let (program, args) = InstallerKind::Msp.invocation(Path::new("fix.msp"));
    /// assert_eq!(program, "msiexec");
    /// assert_eq!(args, ["/p", "fix.msp", "/quiet", "/norestart"]);
    /// ```
    pub fn invocation(&self, file: &Path) -> (OsString, Vec<OsString>) {
        match self {
            Self::Msp => (
                OsString::from("msiexec"),
                vec![
                    OsString::from("/p"),
                    file.as_os_str().to_os_string(),
                    OsString::from("/quiet"),
                    OsString::from("/norestart"),
                ],
            ),
            Self::Exe => (
                file.as_os_str().to_os_string(),
                vec![OsString::from("/quiet"), OsString::from("/norestart")],
            ),
        }
    }
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Msp => write!(f, "MSP"),
            Self::Exe => write!(f, "EXE"),
        }
    }
}

/// Platform a payload URL is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadPlatform {
    Windows,
    Linux,
    Unknown,
}

impl PayloadPlatform {
    /// Classify a download URL.
    ///
    /// Checked case-insensitively in order: `linux` or `.tar` anywhere in the
    /// URL means Linux, then `.msp` or `.exe` means Windows.
    ///
    /// # Examples
    ///
    /// ```
    /// use patchpilot::staging::PayloadPlatform;
    ///
    /// assert_eq!(PayloadPlatform::classify_url("https://h/p/fix.msp"), PayloadPlatform::Windows);
    /// assert_eq!(PayloadPlatform::classify_url("https://h/p/fix.tar.gz"), PayloadPlatform::Linux);
    /// assert_eq!(PayloadPlatform::classify_url("https://h/p/readme.pdf"), PayloadPlatform::Unknown);
    /// ```
    pub fn classify_url(url: &str) -> Self {
        let url = url.to_lowercase();
        if url.contains("linux") || url.contains(".tar") {
            Self::Linux
        } else if url.contains(".msp") || url.contains(".exe") {
            Self::Windows
        } else {
            Self::Unknown
        }
    }

    /// Subdirectory of the patch directory payloads of this platform go in.
    pub fn subdir(&self) -> Option<&'static str> {
        match self {
            Self::Windows => Some("windows"),
            Self::Linux => Some("linux"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for PayloadPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::Linux => write!(f, "linux"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// An installer payload found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFile {
    /// Full path to the payload.
    pub path: PathBuf,

    /// Installer kind, from the extension.
    pub kind: InstallerKind,
}

impl PayloadFile {
    /// Build a payload from a path with a recognized extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = InstallerKind::from_path(&path)?;
        Some(Self { path, kind })
    }

    /// File name component as text.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
