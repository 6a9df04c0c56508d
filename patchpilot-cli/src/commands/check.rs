//! The `check` command: pre-flight report and apply plan, changing nothing.

use clap::Args;
use console::style;
use patchpilot::apply::{ApplyPlan, NoopApplyObserver, PreflightReport};
use patchpilot::install::ServiceState;

use super::common::{field, heading, path_status, system_engine, TargetArgs};
use crate::error::CliError;
use crate::Context;

/// Arguments for the `check` command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Run the check command.
///
/// Exits 1 when there is nothing to apply, matching what `apply` would do.
pub fn run(args: CheckArgs, ctx: &Context) -> Result<u8, CliError> {
    let config = args.target.resolve(&ctx.config);
    heading("Pre-flight Check");
    field("Config file", path_status(&ctx.config_path));
    field("Patches directory", path_status(&config.patches_dir));
    field("Layout", config.layout);

    let engine = system_engine(config, ctx.config.service_timeout());
    let preflight = engine.preflight();
    print_preflight(&preflight);

    let plan = engine.plan(&NoopApplyObserver);
    print_plan(&plan);

    Ok(if plan.discovered == 0 { 1 } else { 0 })
}

fn print_preflight(report: &PreflightReport) {
    heading("Installation");
    field("Install path", path_status(&report.install_path));
    field(
        "Version",
        report.version.as_deref().unwrap_or("(not detected)"),
    );

    heading("Services");
    for (name, state) in &report.services {
        let shown = match state {
            ServiceState::Running => style(state.to_string()).green(),
            ServiceState::NotFound | ServiceState::Unknown => style(state.to_string()).yellow(),
            _ => style(state.to_string()).dim(),
        };
        field(name, shown);
    }
    println!(
        "  {} of {} running",
        report.running_services(),
        report.services.len()
    );
}

fn print_plan(plan: &ApplyPlan) {
    heading("Apply Plan");
    field("Discovered", plan.discovered);
    if !plan.skipped_empty.is_empty() {
        field("No installers", plan.skipped_empty.join(", "));
    }
    if !plan.filtered_out.is_empty() {
        field("Not critical", plan.filtered_out.join(", "));
    }
    for warning in &plan.warnings {
        println!("  {} {}", style("!").yellow(), warning);
    }

    if plan.patches.is_empty() {
        println!();
        println!("  {}", style("Nothing to apply.").yellow());
        return;
    }

    println!();
    for (i, patch) in plan.patches.iter().enumerate() {
        let date = match patch.descriptor.release_date.as_str() {
            "" => "unknown date",
            date => date,
        };
        println!(
            "  {:>2}. {} {}",
            i + 1,
            style(patch.name()).bold(),
            style(format!(
                "[{}, {}, QFE {}]",
                patch.descriptor.criticality(),
                date,
                patch.descriptor.qfe_display()
            ))
            .dim()
        );
        for payload in &patch.payloads {
            println!("        {} ({})", payload.file_name(), payload.kind);
        }
    }
}
