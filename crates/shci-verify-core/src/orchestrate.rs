use crate::compare::{self, ShapeMismatch};
use crate::domain::{HarnessError, HarnessResult, QuantityKind};
use crate::parse::{self, RdmIndex, SpatialRdm};
use crate::policy::TolerancePolicy;
use crate::runner;
use crate::scenario::{Scenario, ScenarioManifest};
use crate::workspace::{CleanupGuard, Workspace};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub manifest_path: PathBuf,
    /// Tolerance policy file; the built-in defaults apply when absent.
    pub policy_path: Option<PathBuf>,
    /// Base directory the scenario directories live under.
    pub base_dir: PathBuf,
    /// Engine binary; a relative path is resolved against each scenario's
    /// workspace directory, so the shipped default reaches the engine the
    /// same way an invocation from inside the scenario directory would.
    pub executable: PathBuf,
    pub report_path: PathBuf,
    /// Upper bound on one engine invocation. None imposes no limit.
    pub timeout: Option<Duration>,
    /// Restrict the batch to one named scenario.
    pub scenario: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("tasks/scenario-manifest.json"),
            policy_path: None,
            base_dir: PathBuf::from("."),
            executable: PathBuf::from("../../build/Dice"),
            report_path: PathBuf::from("artifacts/verify/report.json"),
            timeout: None,
            scenario: None,
        }
    }
}

/// Terminal failure of one scenario. Kinds are mutually exclusive; the
/// first failing step ends the scenario and later steps are not attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseFailure {
    Workspace { detail: String },
    Launch { detail: String },
    Process { detail: String },
    Parse { quantity: QuantityKind, detail: String },
    ShapeMismatch {
        quantity: QuantityKind,
        mismatch: ShapeMismatch,
    },
    ToleranceExceeded {
        quantity: QuantityKind,
        computed: f64,
        reference: f64,
        delta: f64,
        threshold: f64,
        /// Worst offending entry for structured quantities.
        index: Option<RdmIndex>,
        failing_entries: Option<usize>,
    },
}

impl CaseFailure {
    pub fn describe(&self) -> String {
        match self {
            Self::Workspace { detail } => format!("workspace error: {}", detail),
            Self::Launch { detail } => format!("launch error: {}", detail),
            Self::Process { detail } => format!("process error: {}", detail),
            Self::Parse { quantity, detail } => {
                format!("parse error for {}: {}", quantity, detail)
            }
            Self::ShapeMismatch { quantity, mismatch } => {
                format!("shape mismatch for {}: {}", quantity, mismatch)
            }
            Self::ToleranceExceeded {
                quantity,
                delta,
                threshold,
                index: Some(index),
                failing_entries,
                ..
            } => format!(
                "{} tolerance exceeded: worst entry {:?} delta={:e} > {:e} ({} failing)",
                quantity,
                index,
                delta,
                threshold,
                failing_entries.unwrap_or(0)
            ),
            Self::ToleranceExceeded {
                quantity,
                computed,
                reference,
                delta,
                threshold,
                ..
            } => format!(
                "{} tolerance exceeded: computed={} reference={} delta={:e} > {:e}",
                quantity, computed, reference, delta, threshold
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed { delta: f64, tolerance: f64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub quantity: QuantityKind,
    #[serde(flatten)]
    pub status: CheckStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    pub checks: Vec<CheckOutcome>,
    pub failure: Option<CaseFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at_unix_seconds: u64,
    pub passed: bool,
    pub scenario_count: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub scenarios: Vec<ScenarioReport>,
}

/// One check with its tolerance already resolved. Resolution happens for
/// every scenario before any engine execution, so a missing tolerance
/// aborts the batch up front instead of surfacing mid-run.
#[derive(Debug, Clone)]
struct ResolvedCheck {
    quantity: QuantityKind,
    tolerance: f64,
    skip_reason: Option<String>,
}

pub fn run_batch(config: &HarnessConfig) -> HarnessResult<BatchReport> {
    let manifest = ScenarioManifest::from_path(&config.manifest_path).map_err(|source| {
        HarnessError::configuration("CONFIG.MANIFEST", source.to_string())
    })?;

    let policy = match &config.policy_path {
        Some(path) => TolerancePolicy::from_path(path)
            .map_err(|source| HarnessError::configuration("CONFIG.POLICY", source.to_string()))?,
        None => TolerancePolicy::builtin(),
    };

    let selected: Vec<&Scenario> = match &config.scenario {
        Some(name) => vec![manifest.find(name).map_err(|source| {
            HarnessError::configuration("CONFIG.SCENARIO", source.to_string())
        })?],
        None => manifest.scenarios.iter().collect(),
    };

    // Tolerance resolution for every scenario precedes all execution.
    let mut resolved: Vec<(&Scenario, Vec<ResolvedCheck>)> = Vec::with_capacity(selected.len());
    for scenario in selected {
        let mut checks = Vec::with_capacity(scenario.checks.len());
        for check in &scenario.checks {
            let tolerance = policy
                .resolve(check.quantity, check.tolerance)
                .map_err(|source| {
                    HarnessError::configuration(
                        "CONFIG.TOLERANCE",
                        format!("scenario '{}': {}", scenario.name, source),
                    )
                })?;
            checks.push(ResolvedCheck {
                quantity: check.quantity,
                tolerance,
                skip_reason: check.skip_reason.clone(),
            });
        }
        resolved.push((scenario, checks));
    }

    let mut scenario_reports = Vec::with_capacity(resolved.len());
    for (scenario, checks) in resolved {
        info!(scenario = scenario.name.as_str(), "running scenario");
        let report = run_scenario(config, scenario, &checks);
        info!(
            scenario = scenario.name.as_str(),
            passed = report.passed,
            "scenario finished"
        );
        scenario_reports.push(report);
    }

    let scenario_count = scenario_reports.len();
    let passed_count = scenario_reports.iter().filter(|report| report.passed).count();
    let failed_count = scenario_count.saturating_sub(passed_count);

    let report = BatchReport {
        generated_at_unix_seconds: current_unix_timestamp_seconds(),
        passed: failed_count == 0,
        scenario_count,
        passed_count,
        failed_count,
        scenarios: scenario_reports,
    };

    write_report_file(&config.report_path, &report)?;
    Ok(report)
}

fn run_scenario(
    config: &HarnessConfig,
    scenario: &Scenario,
    checks: &[ResolvedCheck],
) -> ScenarioReport {
    let workspace = match Workspace::enter(&config.base_dir, &scenario.directory) {
        Ok(workspace) => workspace,
        Err(source) => {
            return failed_report(scenario, Vec::new(), CaseFailure::Workspace {
                detail: source.to_string(),
            });
        }
    };

    // Cleanup runs when the guard drops, on success, failure, and panic
    // alike, and always before the next scenario starts.
    let _guard = CleanupGuard::new(&workspace);

    let executable = resolve_executable(workspace.dir(), &config.executable);
    if let Err(source) = runner::run(&executable, &workspace, config.timeout) {
        let failure = if source.is_launch_failure() {
            CaseFailure::Launch {
                detail: source.to_string(),
            }
        } else {
            CaseFailure::Process {
                detail: source.to_string(),
            }
        };
        return failed_report(scenario, Vec::new(), failure);
    }

    let mut outcomes = Vec::with_capacity(checks.len());
    for check in checks {
        if let Some(reason) = &check.skip_reason {
            outcomes.push(CheckOutcome {
                quantity: check.quantity,
                status: CheckStatus::Skipped {
                    reason: reason.clone(),
                },
            });
            continue;
        }

        match evaluate_check(workspace.dir(), check) {
            Ok(outcome) => outcomes.push(outcome),
            Err(failure) => return failed_report(scenario, outcomes, failure),
        }
    }

    ScenarioReport {
        name: scenario.name.clone(),
        passed: true,
        checks: outcomes,
        failure: None,
    }
}

fn evaluate_check(workspace: &Path, check: &ResolvedCheck) -> Result<CheckOutcome, CaseFailure> {
    match check.quantity {
        QuantityKind::Energy => {
            let computed = parse::parse_energy(workspace)
                .map_err(|source| parse_failure(check.quantity, source))?;
            let reference = parse::parse_energy_file(
                &workspace.join(QuantityKind::Energy.reference_artifact()),
            )
            .map_err(|source| parse_failure(check.quantity, source))?;

            let comparison = compare::compare_energy(computed, reference, check.tolerance);
            if !comparison.passed {
                return Err(CaseFailure::ToleranceExceeded {
                    quantity: check.quantity,
                    computed: comparison.computed,
                    reference: comparison.reference,
                    delta: comparison.delta,
                    threshold: comparison.tolerance,
                    index: None,
                    failing_entries: None,
                });
            }
            Ok(CheckOutcome {
                quantity: check.quantity,
                status: CheckStatus::Passed {
                    delta: comparison.delta,
                    tolerance: comparison.tolerance,
                },
            })
        }
        QuantityKind::SpatialRdm => {
            let computed = parse::parse_rdm(workspace)
                .map_err(|source| parse_failure(check.quantity, source))?;
            let reference = parse_reference_rdm(workspace)
                .map_err(|source| parse_failure(check.quantity, source))?;

            let comparison = compare::compare_rdm(&computed, &reference, check.tolerance)
                .map_err(|mismatch| CaseFailure::ShapeMismatch {
                    quantity: check.quantity,
                    mismatch,
                })?;
            if !comparison.passed {
                // A failing comparison compared at least one entry.
                let worst = comparison.worst.unwrap_or(compare::RdmDeviation {
                    index: [0; 4],
                    computed: 0.0,
                    reference: 0.0,
                    delta: comparison.max_delta,
                });
                return Err(CaseFailure::ToleranceExceeded {
                    quantity: check.quantity,
                    computed: worst.computed,
                    reference: worst.reference,
                    delta: worst.delta,
                    threshold: comparison.tolerance,
                    index: Some(worst.index),
                    failing_entries: Some(comparison.failing_entries),
                });
            }
            Ok(CheckOutcome {
                quantity: check.quantity,
                status: CheckStatus::Passed {
                    delta: comparison.max_delta,
                    tolerance: comparison.tolerance,
                },
            })
        }
    }
}

fn parse_reference_rdm(workspace: &Path) -> Result<SpatialRdm, parse::ParseError> {
    parse::parse_rdm_file(&workspace.join(QuantityKind::SpatialRdm.reference_artifact()))
}

fn parse_failure(quantity: QuantityKind, source: parse::ParseError) -> CaseFailure {
    CaseFailure::Parse {
        quantity,
        detail: source.to_string(),
    }
}

fn failed_report(
    scenario: &Scenario,
    checks: Vec<CheckOutcome>,
    failure: CaseFailure,
) -> ScenarioReport {
    ScenarioReport {
        name: scenario.name.clone(),
        passed: false,
        checks,
        failure: Some(failure),
    }
}

/// Relative engine paths resolve against the scenario workspace, the same
/// directory the engine runs in. The `../../build/Dice` default therefore
/// lands at `<repo>/build/Dice` for scenarios under `<repo>/tests/`.
fn resolve_executable(workspace_dir: &Path, executable: &Path) -> PathBuf {
    if executable.is_absolute() {
        executable.to_path_buf()
    } else {
        workspace_dir.join(executable)
    }
}

pub fn render_human_summary(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    let status = if report.passed { "PASS" } else { "FAIL" };
    lines.push(format!("Batch status: {}", status));
    lines.push(format!(
        "Scenarios: {} total ({} passed, {} failed)",
        report.scenario_count, report.passed_count, report.failed_count
    ));

    for scenario in &report.scenarios {
        let scenario_status = if scenario.passed { "PASS" } else { "FAIL" };
        match &scenario.failure {
            Some(failure) => lines.push(format!(
                "Scenario {}: {} ({})",
                scenario.name,
                scenario_status,
                failure.describe()
            )),
            None => lines.push(format!("Scenario {}: {}", scenario.name, scenario_status)),
        }

        for check in &scenario.checks {
            match &check.status {
                CheckStatus::Passed { delta, tolerance } => lines.push(format!(
                    "  {}: ok (delta={:e} <= {:e})",
                    check.quantity, delta, tolerance
                )),
                CheckStatus::Skipped { reason } => {
                    lines.push(format!("  {}: skipped ({})", check.quantity, reason));
                }
            }
        }
    }

    lines.join("\n")
}

fn write_report_file(report_path: &Path, report: &BatchReport) -> HarnessResult<()> {
    if let Some(parent_dir) = report_path.parent()
        && !parent_dir.as_os_str().is_empty()
    {
        fs::create_dir_all(parent_dir).map_err(|source| {
            HarnessError::io_system(
                "IO.REPORT_DIR",
                format!(
                    "failed to create report directory '{}': {}",
                    parent_dir.display(),
                    source
                ),
            )
        })?;
    }

    let report_json = serde_json::to_string_pretty(report).map_err(|source| {
        HarnessError::internal(
            "SYS.REPORT_SERIALIZE",
            format!(
                "failed to serialize report '{}': {}",
                report_path.display(),
                source
            ),
        )
    })?;
    fs::write(report_path, report_json).map_err(|source| {
        HarnessError::io_system(
            "IO.REPORT_WRITE",
            format!("failed to write report '{}': {}", report_path.display(), source),
        )
    })
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
