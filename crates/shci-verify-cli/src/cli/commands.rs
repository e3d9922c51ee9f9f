use super::CliError;
use anyhow::Context;
use shci_verify_core::orchestrate::{HarnessConfig, render_human_summary, run_batch};
use shci_verify_core::{HarnessError, ScenarioManifest};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Scenario manifest path
    #[arg(long, default_value = "tasks/scenario-manifest.json")]
    manifest: PathBuf,

    /// Tolerance policy path; built-in defaults apply when omitted
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Directory the scenario directories live under
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Engine binary; a relative path is resolved against each scenario directory
    #[arg(long, default_value = "../../build/Dice")]
    executable: PathBuf,

    /// JSON report output path
    #[arg(long, default_value = "artifacts/verify/report.json")]
    report: PathBuf,

    /// Run only the named scenario
    #[arg(long)]
    scenario: Option<String>,

    /// Kill an engine run exceeding this many seconds; unlimited when omitted
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(clap::Args)]
pub(super) struct ListArgs {
    /// Scenario manifest path
    #[arg(long, default_value = "tasks/scenario-manifest.json")]
    manifest: PathBuf,
}

pub(super) fn run_run_command(args: RunArgs) -> Result<i32, CliError> {
    let working_dir = current_working_dir()?;
    let config = HarnessConfig {
        manifest_path: resolve_cli_path(&working_dir, &args.manifest),
        policy_path: args
            .policy
            .as_deref()
            .map(|path| resolve_cli_path(&working_dir, path)),
        base_dir: resolve_cli_path(&working_dir, &args.base_dir),
        executable: args.executable,
        report_path: resolve_cli_path(&working_dir, &args.report),
        timeout: args.timeout_secs.map(Duration::from_secs),
        scenario: args.scenario,
    };

    let report = run_batch(&config).map_err(CliError::Harness)?;
    println!("{}", render_human_summary(&report));

    Ok(if report.passed { 0 } else { 1 })
}

pub(super) fn run_list_command(args: ListArgs) -> Result<i32, CliError> {
    let working_dir = current_working_dir()?;
    let manifest_path = resolve_cli_path(&working_dir, &args.manifest);
    let manifest = ScenarioManifest::from_path(&manifest_path).map_err(|source| {
        CliError::Harness(HarnessError::configuration(
            "CONFIG.MANIFEST",
            source.to_string(),
        ))
    })?;

    for scenario in &manifest.scenarios {
        println!("{} ({})", scenario.name, scenario.directory);
        for check in &scenario.checks {
            match &check.skip_reason {
                Some(reason) => println!("  {}: skipped ({})", check.quantity, reason),
                None => match check.tolerance {
                    Some(tolerance) => {
                        println!("  {}: tolerance {:e}", check.quantity, tolerance);
                    }
                    None => println!("  {}: policy tolerance", check.quantity),
                },
            }
        }
    }

    Ok(0)
}

fn current_working_dir() -> Result<PathBuf, CliError> {
    std::env::current_dir()
        .context("failed to read current working directory")
        .map_err(CliError::from)
}

fn resolve_cli_path(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
