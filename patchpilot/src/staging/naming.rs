//! Staging directory naming.
//!
//! The download side and the apply side both derive a patch's directory from
//! its catalog name, so the rule lives here and nowhere else.

/// Characters that cannot appear in a staging directory name.
const REPLACED_CHARS: [char; 4] = [' ', '/', '\\', ':'];

/// Name of the per-patch staging directory for a catalog entry name.
///
/// Each space, `/`, `\` and `:` is replaced by `_`. Other characters are kept
/// as-is.
///
/// # Examples
///
/// ```
/// use patchpilot::staging::staging_dir_name;
///
/// assert_eq!(
///     staging_dir_name("ArcGIS Server 11.1 Security Patch"),
///     "ArcGIS_Server_11.1_Security_Patch"
/// );
/// assert_eq!(staging_dir_name("a/b\\c:d"), "a_b_c_d");
/// ```
pub fn staging_dir_name(name: &str) -> String {
    name.replace(REPLACED_CHARS, "_")
}
