//! Per-patch descriptor files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::PatchCatalogEntry;

use super::error::DiscoveryWarning;

/// File name of the descriptor written next to a patch's payloads.
pub const DESCRIPTOR_FILE_NAME: &str = "patch_info.json";

/// Path of the descriptor inside a patch directory.
pub fn descriptor_path(patch_dir: &Path) -> PathBuf {
    patch_dir.join(DESCRIPTOR_FILE_NAME)
}

/// Write `entry` as a pretty-printed descriptor into `patch_dir`.
///
/// The directory must already exist. Returns the descriptor path.
pub fn write_descriptor(patch_dir: &Path, entry: &PatchCatalogEntry) -> io::Result<PathBuf> {
    let path = descriptor_path(patch_dir);
    let json = entry.to_descriptor_json()?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Read the descriptor in `patch_dir`.
///
/// Returns `Ok(None)` when the directory has no descriptor at all, which is
/// not a warning condition: the directory simply is not a staged patch.
pub fn read_descriptor(patch_dir: &Path) -> Result<Option<PatchCatalogEntry>, DiscoveryWarning> {
    let path = descriptor_path(patch_dir);
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| DiscoveryWarning::UnreadableDescriptor {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| DiscoveryWarning::MalformedDescriptor {
            path,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let mut entry = PatchCatalogEntry::new("ArcGIS Server Patch");
        entry.critical = "Security".to_string();
        entry.release_date = "2024-02-01".to_string();

        let path = write_descriptor(temp.path(), &entry).unwrap();
        assert_eq!(path.file_name().unwrap(), DESCRIPTOR_FILE_NAME);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'), "descriptor should be pretty-printed");

        let read = read_descriptor(temp.path()).unwrap().unwrap();
        assert_eq!(read, entry);
    }

    #[test]
    fn test_read_missing_descriptor() {
        let temp = TempDir::new().unwrap();
        assert!(read_descriptor(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_read_malformed_descriptor() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(DESCRIPTOR_FILE_NAME), "[1, 2").unwrap();

        let result = read_descriptor(temp.path());
        assert!(matches!(
            result,
            Err(DiscoveryWarning::MalformedDescriptor { .. })
        ));
    }
}
