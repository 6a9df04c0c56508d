//! Resolution of catalog entries for a product version and platform.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::model::{CatalogDocument, PatchCatalogEntry};

/// Default product version patches are resolved for.
pub const DEFAULT_PRODUCT_VERSION: &str = "11.1";

/// Default product family names matched against a patch's `Products` field.
pub const DEFAULT_PRODUCT_FAMILIES: &[&str] = &["ArcGIS Server", "ArcGIS Enterprise"];

/// Platform selection for catalog filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformFilter {
    Windows,
    Linux,
    /// Disables platform filtering.
    #[default]
    Both,
}

impl PlatformFilter {
    /// Lower-case token searched for in a patch's platform tag.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Both => "both",
        }
    }

    /// Whether a platform tag satisfies this filter.
    pub fn matches(&self, platform_tag: &str) -> bool {
        match self {
            Self::Both => true,
            _ => platform_tag.to_lowercase().contains(self.token()),
        }
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for PlatformFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "invalid platform '{}': expected windows, linux or both",
                other
            )),
        }
    }
}

/// The product version and family names patches must apply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSelector {
    /// Exact product version (compared against `Product[].version`).
    pub version: String,

    /// Family names; an entry matches if its `Products` field contains any.
    pub families: Vec<String>,
}

impl Default for ProductSelector {
    fn default() -> Self {
        Self {
            version: DEFAULT_PRODUCT_VERSION.to_string(),
            families: DEFAULT_PRODUCT_FAMILIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ProductSelector {
    /// Create a selector for a version with the given families.
    pub fn new(version: impl Into<String>, families: Vec<String>) -> Self {
        Self {
            version: version.into(),
            families,
        }
    }

    /// Whether a `Products` applicability string names one of the families.
    ///
    /// Matching is substring-based and case-sensitive, mirroring the
    /// catalog's own casing.
    pub fn applies_to(&self, products: &str) -> bool {
        self.families
            .iter()
            .any(|family| !family.is_empty() && products.contains(family.as_str()))
    }
}

/// Return every entry that applies to the selected product and platform.
///
/// Entries keep catalog order.
pub fn filter(
    doc: &CatalogDocument,
    selector: &ProductSelector,
    platform: PlatformFilter,
) -> Vec<PatchCatalogEntry> {
    let matched: Vec<PatchCatalogEntry> = doc
        .products
        .iter()
        .filter(|product| product.version == selector.version)
        .flat_map(|product| product.patches.iter())
        .filter(|entry| selector.applies_to(&entry.products))
        .filter(|entry| platform.matches(&entry.platform))
        .cloned()
        .collect();

    debug!(
        version = %selector.version,
        platform = %platform,
        matched = matched.len(),
        total = doc.patch_count(),
        "Filtered patch catalog"
    );

    matched
}
