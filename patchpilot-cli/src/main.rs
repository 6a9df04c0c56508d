//! PatchPilot CLI - download and apply ArcGIS patches
//!
//! `download` stages the patches a catalog lists for the configured product,
//! `apply` installs a staged set with backup and service bracketing.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use patchpilot::config::{config_file_path, ConfigFile};
use patchpilot::logging;
use tracing::warn;

use commands::apply::ApplyArgs;
use commands::check::CheckArgs;
use commands::config::ConfigCommands;
use commands::download::DownloadArgs;
use commands::restore::RestoreArgs;
use error::CliError;

/// Exit status after an interrupt.
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "patchpilot")]
#[command(about = "Download, verify and apply ArcGIS patches", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file to use instead of the per-user one
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides logging.level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for the rolling log file and run reports
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Also write log lines to the terminal
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download the patches a catalog lists for this product
    Download(DownloadArgs),

    /// Apply staged patches to the installation
    Apply(ApplyArgs),

    /// Show what `apply` would do without changing anything
    Check(CheckArgs),

    /// Restore the installation from a backup
    Restore(RestoreArgs),

    /// View or edit configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Settings shared by every command.
pub struct Context {
    pub config: ConfigFile,
    pub config_path: PathBuf,
}

impl Context {
    /// Directory for reports and the rolling log.
    pub fn log_dir(&self) -> PathBuf {
        self.config.logging.log_dir.clone()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config_path = cli.config.clone().unwrap_or_else(config_file_path);

    // Config commands must work even when the file is broken.
    let command = match cli.command {
        Commands::Config { command } => {
            commands::config::run(command, &config_path)?;
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let mut config = ConfigFile::load_from(&config_path)?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.logging.log_dir = dir.clone();
    }

    let _guard = logging::init(&config.logging_config().with_stdout(cli.verbose))?;

    ctrlc::set_handler(|| {
        warn!("Interrupted, exiting");
        eprintln!();
        eprintln!("Interrupted.");
        std::process::exit(INTERRUPTED_EXIT);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let ctx = Context {
        config,
        config_path,
    };

    let code = match command {
        Commands::Download(args) => commands::download::run(args, &ctx)?,
        Commands::Apply(args) => commands::apply::run(args, &ctx)?,
        Commands::Check(args) => commands::check::run(args, &ctx)?,
        Commands::Restore(args) => commands::restore::run(args, &ctx)?,
        // Dispatched before the configuration is loaded.
        Commands::Config { .. } => 0,
    };

    Ok(ExitCode::from(code))
}
