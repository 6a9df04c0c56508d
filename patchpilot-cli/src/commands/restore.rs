//! The `restore` command.
//!
//! Copies a backup taken by `apply` back over the install path. This is the
//! only way a backup is ever used; `apply` never rolls back on its own.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use patchpilot::install::{list_backups, restore, restore_latest, CopyStats};

use super::common::{field, heading};
use crate::error::CliError;
use crate::Context;

/// Arguments for the `restore` command.
#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Backup directory to restore (defaults to the newest one)
    #[arg(long, value_name = "PATH")]
    pub backup: Option<PathBuf>,

    /// Root directory holding backups
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Installation directory to restore into
    #[arg(long)]
    pub install_path: Option<PathBuf>,

    /// List available backups and exit
    #[arg(long, conflicts_with = "backup")]
    pub list: bool,
}

/// Run the restore command.
pub fn run(args: RestoreArgs, ctx: &Context) -> Result<u8, CliError> {
    let backup_dir = args
        .backup_dir
        .unwrap_or_else(|| ctx.config.apply.backup_dir.clone());
    let install_path = args
        .install_path
        .unwrap_or_else(|| ctx.config.apply.install_path.clone());

    if args.list {
        return list(&backup_dir);
    }

    heading("Restore");
    field("Install path", install_path.display());

    let (source, stats) = match args.backup {
        Some(path) => {
            let stats = restore(&path, &install_path)?;
            (path, stats)
        }
        None => restore_latest(&backup_dir, &install_path)?,
    };

    print_restored(&source, stats);
    Ok(0)
}

fn list(backup_dir: &Path) -> Result<u8, CliError> {
    let backups = list_backups(backup_dir)?;
    heading("Backups");
    field("Backup directory", backup_dir.display());

    if backups.is_empty() {
        println!("  {}", style("No backups found.").yellow());
        return Ok(0);
    }

    let newest = backups.len() - 1;
    for (i, backup) in backups.iter().enumerate() {
        let name = backup
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if i == newest {
            println!("  {} {}", name, style("(latest)").green());
        } else {
            println!("  {}", name);
        }
    }
    Ok(0)
}

fn print_restored(source: &Path, stats: CopyStats) {
    field("Restored from", source.display());
    field("Files", stats.files);
    field("Bytes", stats.bytes);
    println!();
    println!("  {}", style("Restore complete.").green());
}
