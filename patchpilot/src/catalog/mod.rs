//! Patch catalog loading and resolution.
//!
//! The catalog is a JSON document published upstream that lists every patch
//! for every product version:
//!
//! ```text
//! CatalogDocument
//! └── Product[]            (version = "11.1", ...)
//!     └── patches[]        PatchCatalogEntry
//!         ├── Name, QFE_ID, Critical, ReleaseDate
//!         ├── Platform, Products
//!         ├── PatchFiles[] (download URLs)
//!         └── MD5sums[]    ("file.msp:CHECKSUM")
//! ```
//!
//! [`filter`] resolves the entries that apply to a [`ProductSelector`] and a
//! [`PlatformFilter`]. [`Criticality`] centralizes the free-form criticality
//! vocabulary used for ordering and the critical-only mode.

mod error;
mod filter;
mod model;
mod priority;

pub use error::{CatalogError, CatalogResult};
pub use filter::{
    filter, PlatformFilter, ProductSelector, DEFAULT_PRODUCT_FAMILIES, DEFAULT_PRODUCT_VERSION,
};
pub use model::{CatalogDocument, CatalogProduct, PatchCatalogEntry};
pub use priority::{apply_order_key, Criticality};
