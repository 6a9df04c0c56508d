//! The `download` command.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::ProgressBar;
use patchpilot::catalog::{CatalogDocument, PatchCatalogEntry};
use patchpilot::download::{
    DownloadConfig, DownloadLedger, DownloadManager, DownloadObserver, DownloadOutcome,
    DownloadRecord, HttpFetcher,
};
use patchpilot::report::write_download_summary;
use tracing::{error, info};

use super::common::{field, heading, PlatformArg};
use crate::error::CliError;
use crate::progress::create_transfer_bar;
use crate::Context;

/// Arguments for the `download` command.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Which payload platforms to fetch
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,

    /// Staging directory to download into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Patch catalog JSON file
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Product version to select from the catalog
    #[arg(long)]
    pub product_version: Option<String>,

    /// Delay between transfers, in milliseconds
    #[arg(long)]
    pub throttle_ms: Option<u64>,
}

impl DownloadArgs {
    /// Download configuration from the config file with these flags on top.
    pub fn resolve(&self, ctx: &Context) -> DownloadConfig {
        let mut config = ctx.config.download_config();
        if let Some(platform) = self.platform {
            config.platform = platform.into();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(version) = &self.product_version {
            config.selector.version = version.clone();
        }
        if let Some(ms) = self.throttle_ms {
            config.throttle = Duration::from_millis(ms);
        }
        config
    }

    fn catalog_path(&self, ctx: &Context) -> PathBuf {
        self.catalog
            .clone()
            .unwrap_or_else(|| ctx.config.catalog.path.clone())
    }
}

/// Shows one transfer bar and prints a line per patch and file above it.
struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    fn new() -> Self {
        Self {
            bar: create_transfer_bar(),
        }
    }
}

impl DownloadObserver for TransferProgress {
    fn on_patch_start(&self, index: usize, total: usize, entry: &PatchCatalogEntry) {
        self.bar.println(format!(
            "{} {}",
            style(format!("[{}/{}]", index, total)).dim(),
            style(&entry.name).bold()
        ));
    }

    fn on_file_start(&self, file_name: &str) {
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_message(file_name.to_string());
    }

    fn on_progress(&self, downloaded: u64, total: u64) {
        if total > 0 {
            self.bar.set_length(total);
        }
        self.bar.set_position(downloaded);
    }

    fn on_file_done(&self, record: &DownloadRecord) {
        let mark = match &record.outcome {
            DownloadOutcome::Fetched { .. } => style("✓").green(),
            DownloadOutcome::AlreadyPresent => style("=").cyan(),
            DownloadOutcome::Failed { .. } => style("✗").red(),
        };
        self.bar
            .println(format!("    {} {} ({})", mark, record.file_name, record.outcome));
    }
}

/// Run the download command.
pub fn run(args: DownloadArgs, ctx: &Context) -> Result<u8, CliError> {
    let config = args.resolve(ctx);
    let catalog_path = args.catalog_path(ctx);

    heading("Patch Download");
    field("Catalog", catalog_path.display());
    field("Product version", &config.selector.version);
    field("Products", config.selector.families.join(", "));
    field("Platform", config.platform);
    field("Output directory", config.output_dir.display());

    let doc = CatalogDocument::load(&catalog_path).map_err(|e| {
        error!(catalog = %catalog_path.display(), error = %e, "Cannot load catalog");
        e
    })?;

    let fetcher = HttpFetcher::with_timeout(config.request_timeout)?;
    let summary_dir = config.summary_dir();
    let output_dir = config.output_dir.clone();
    let manager = DownloadManager::new(fetcher, config);

    let progress = TransferProgress::new();
    let ledger = manager.run(&doc, &progress);
    progress.bar.finish_and_clear();

    print_totals(&ledger);

    match write_download_summary(&ledger, &output_dir, &summary_dir) {
        Ok(path) => {
            info!(path = %path.display(), "Wrote download summary");
            field("Summary", path.display());
        }
        Err(e) => {
            error!(error = %e, "Cannot write download summary");
            eprintln!("Warning: could not write summary: {}", e);
        }
    }

    Ok(0)
}

fn print_totals(ledger: &DownloadLedger) {
    heading("Summary");
    field("Patches matched", ledger.patches_matched);
    field("Files succeeded", style(ledger.success_count()).green());
    let failed = ledger.failure_count();
    if failed > 0 {
        field("Files failed", style(failed).red());
    } else {
        field("Files failed", failed);
    }
    field("Transferred", format!("{} files", ledger.transfer_count()));
    field("Bytes", ledger.bytes_transferred());
    if !ledger.patches_without_files.is_empty() {
        field("No files listed", ledger.patches_without_files.join(", "));
    }
}
