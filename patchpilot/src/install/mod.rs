//! Installation state management.
//!
//! Safety operations that bracket the apply phase: a full backup of the
//! install tree, a stop/start cycle of dependent services, and probing of the
//! installed version. All of them are best effort and report problems as
//! warnings.
//!
//! Restoring a backup is never done automatically; [`restore`] and
//! [`restore_latest`] exist for an operator to invoke.

mod backup;
mod services;
mod version;

pub use backup::{
    backup, copy_dir_recursive, latest_backup, list_backups, prune_backups, restore,
    restore_latest, BackupResult, BackupWarning, CopyStats, RestoreError, BACKUP_PREFIX,
};
pub use services::{
    query_services, start_services, stop_services, unit_name, ServiceAction, ServiceControlReport,
    ServiceControlWarning, ServiceController, ServiceState, SystemServiceController,
    DEFAULT_SERVICES, DEFAULT_SERVICE_TIMEOUT,
};
pub use version::{
    parse_reg_query, RegistryVersionProbe, VersionProbe, DEFAULT_REGISTRY_KEY,
    DEFAULT_REGISTRY_VALUE,
};
