//! Regression-verification harness for an SHCI (semistochastic heat-bath
//! configuration interaction) engine. Scenarios run the engine binary in
//! an isolated workspace, parse the numeric artifacts it writes, and
//! validate them against trusted references under per-quantity tolerances.

pub mod compare;
pub mod domain;
pub mod orchestrate;
pub mod parse;
pub mod policy;
pub mod runner;
pub mod scenario;
pub mod workspace;

pub use domain::{HarnessError, HarnessErrorCategory, HarnessResult, QuantityKind};
pub use orchestrate::{BatchReport, HarnessConfig, render_human_summary, run_batch};
pub use policy::TolerancePolicy;
pub use scenario::ScenarioManifest;
pub use workspace::{CleanupGuard, Workspace};
