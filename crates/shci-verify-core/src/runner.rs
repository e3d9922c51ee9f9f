use crate::workspace::Workspace;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Name of the run log the engine's stdout/stderr is captured into. Matches
/// the `*.log` cleanup glob, so it never survives a scenario.
pub const RUN_LOG_NAME: &str = "shci-verify-run.log";

const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The engine binary could not be started at all. A harness-level
    /// failure, distinct from any scientific mismatch.
    #[error("failed to launch engine '{executable}': {source}")]
    Launch {
        executable: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create run log '{path}': {source}")]
    RunLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("engine exited with {status}")]
    Failed { status: String },
    #[error("engine exceeded the {limit:?} timeout and was killed")]
    TimedOut { limit: Duration },
    #[error("failed waiting for engine: {source}")]
    Wait { source: std::io::Error },
}

impl RunnerError {
    /// True for errors where the process never started, as opposed to
    /// started-but-did-not-complete.
    pub const fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. } | Self::RunLog { .. })
    }
}

/// Invokes the engine synchronously with the workspace as its working
/// directory and no arguments; the engine reads its configuration from
/// files already present there. Blocks until exit, or until `timeout`
/// elapses when one is configured. No retries: the computation is assumed
/// deterministic for fixed inputs.
pub fn run(
    executable: &Path,
    workspace: &Workspace,
    timeout: Option<Duration>,
) -> Result<Completion, RunnerError> {
    let log_path = workspace.dir().join(RUN_LOG_NAME);
    let log_file = File::create(&log_path).map_err(|source| RunnerError::RunLog {
        path: log_path.clone(),
        source,
    })?;
    let log_for_stderr = log_file.try_clone().map_err(|source| RunnerError::RunLog {
        path: log_path,
        source,
    })?;

    let started = Instant::now();
    let mut child = Command::new(executable)
        .current_dir(workspace.dir())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_for_stderr))
        .spawn()
        .map_err(|source| RunnerError::Launch {
            executable: executable.to_path_buf(),
            source,
        })?;

    debug!(executable = %executable.display(), workspace = %workspace.dir().display(), "engine launched");

    let status = match timeout {
        None => child.wait().map_err(|source| RunnerError::Wait { source })?,
        Some(limit) => loop {
            match child.try_wait().map_err(|source| RunnerError::Wait { source })? {
                Some(status) => break status,
                None if started.elapsed() >= limit => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunnerError::TimedOut { limit });
                }
                None => std::thread::sleep(TIMEOUT_POLL_INTERVAL),
            }
        },
    };

    match status.code() {
        Some(0) => {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "engine completed");
            Ok(Completion { exit_code: 0 })
        }
        Some(code) => Err(RunnerError::Failed {
            status: format!("exit code {}", code),
        }),
        None => Err(RunnerError::Failed {
            status: "termination by signal".to_string(),
        }),
    }
}
