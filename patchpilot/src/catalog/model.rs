//! Catalog document model.
//!
//! Field names mirror the upstream JSON (`Name`, `QFE_ID`, `PatchFiles`, ...).
//! Fields this crate does not interpret are kept in `extra` so a patch entry
//! can be written back to disk as a verbatim descriptor.

use std::fs;
use std::io;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::{CatalogError, CatalogResult};
use super::priority::Criticality;

/// The whole published catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// One entry per product version.
    #[serde(rename = "Product", default)]
    pub products: Vec<CatalogProduct>,
}

/// A product version and the patches published for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Product version string (e.g. "11.1").
    #[serde(default)]
    pub version: String,

    /// Patches published for this version.
    #[serde(default, deserialize_with = "entries_with_source")]
    pub patches: Vec<PatchCatalogEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One available patch as published upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchCatalogEntry {
    /// Display name; also the stable key the staging directory derives from.
    #[serde(rename = "Name")]
    pub name: String,

    /// QFE / advisory identifier.
    #[serde(rename = "QFE_ID", default)]
    pub qfe_id: Option<String>,

    /// Free-form criticality ("Security", "true", "low", ...).
    #[serde(
        rename = "Critical",
        default,
        deserialize_with = "string_or_bool"
    )]
    pub critical: String,

    /// Release date, expected to be a zero-padded ISO-like string.
    #[serde(rename = "ReleaseDate", default)]
    pub release_date: String,

    /// Platform tag ("Windows", "Linux", "Windows, Linux").
    #[serde(rename = "Platform", default)]
    pub platform: String,

    /// Comma separated list of products the patch applies to.
    #[serde(rename = "Products", default)]
    pub products: String,

    /// Ordered payload download URLs.
    #[serde(rename = "PatchFiles", default)]
    pub patch_files: Vec<String>,

    /// Optional `"filename:checksum"` entries.
    #[serde(rename = "MD5sums", default)]
    pub md5sums: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The catalog object this entry was parsed from, written back unchanged.
    #[serde(skip)]
    pub(crate) source: Option<Map<String, Value>>,
}

impl CatalogDocument {
    /// Load a catalog document from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the path does not resolve to a file
    /// - [`CatalogError::Unreadable`] for any other I/O failure
    /// - [`CatalogError::Malformed`] if the JSON does not match the catalog shape
    pub fn load(path: &Path) -> CatalogResult<Self> {
        if !path.is_file() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CatalogError::NotFound(path.to_path_buf()),
            _ => CatalogError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        Self::parse_from(&content, &path.display().to_string())
    }

    /// Parse a catalog document from a JSON string.
    pub fn parse(content: &str) -> CatalogResult<Self> {
        Self::parse_from(content, "<memory>")
    }

    fn parse_from(content: &str, origin: &str) -> CatalogResult<Self> {
        serde_json::from_str(content).map_err(|e| CatalogError::Malformed {
            origin: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Total number of patch entries across all products.
    pub fn patch_count(&self) -> usize {
        self.products.iter().map(|p| p.patches.len()).sum()
    }
}

impl PatchCatalogEntry {
    /// Create an entry with the given display name and no other fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Advisory identifier, or `"N/A"` when the catalog omits it.
    pub fn qfe_display(&self) -> &str {
        self.qfe_id.as_deref().unwrap_or("N/A")
    }

    /// Normalized criticality class.
    pub fn criticality(&self) -> Criticality {
        Criticality::classify(&self.critical)
    }

    /// Published checksum for a payload file name, if any.
    ///
    /// Entries are `"filename:checksum"`; the file name must match exactly.
    pub fn checksum_for(&self, filename: &str) -> Option<&str> {
        self.md5sums.iter().find_map(|entry| {
            let (name, checksum) = entry.split_once(':')?;
            let checksum = checksum.trim();
            (name.trim() == filename && !checksum.is_empty()).then_some(checksum)
        })
    }

    /// Serialize this entry as a pretty-printed descriptor.
    ///
    /// Entries parsed from a catalog are written exactly as published, so a
    /// boolean `Critical` or a null `QFE_ID` survives the round trip.
    pub fn to_descriptor_json(&self) -> serde_json::Result<String> {
        match &self.source {
            Some(object) => serde_json::to_string_pretty(object),
            None => serde_json::to_string_pretty(self),
        }
    }
}

/// Deserialize patch entries, keeping each published object alongside.
fn entries_with_source<'de, D>(deserializer: D) -> Result<Vec<PatchCatalogEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Map<String, Value>>::deserialize(deserializer)?
        .into_iter()
        .map(|object| {
            let mut entry = PatchCatalogEntry::deserialize(Value::Object(object.clone()))
                .map_err(D::Error::custom)?;
            entry.source = Some(object);
            Ok(entry)
        })
        .collect()
}

/// Accept either a JSON string or a boolean for the criticality field.
fn string_or_bool<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}
