//! Local patch staging directory.
//!
//! The download manager writes one directory per patch:
//!
//! ```text
//! <staging dir>/
//! └── ArcGIS_Server_11.1_Security_Patch/
//!     ├── patch_info.json
//!     ├── windows/fix.msp
//!     └── linux/fix.tar
//! ```
//!
//! [`scan`] turns such a tree back into [`StagedPatch`] values for the apply
//! engine.

mod descriptor;
mod error;
mod naming;
mod payload;
mod scanner;

pub use descriptor::{descriptor_path, read_descriptor, write_descriptor, DESCRIPTOR_FILE_NAME};
pub use error::DiscoveryWarning;
pub use naming::staging_dir_name;
pub use payload::{InstallerKind, PayloadFile, PayloadPlatform};
pub use scanner::{scan, Inventory, ScanLayout, StagedPatch};
