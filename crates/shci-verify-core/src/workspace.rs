use crate::domain::{HarnessError, HarnessResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File patterns the engine is known to generate during a run. Cleanup
/// removes exactly these; scenario inputs and `trusted*` references never
/// match any of them.
pub const GENERATED_ARTIFACT_GLOBS: [&str; 8] = [
    "shci.e",
    "*.bkp",
    "spatialRDM.*.txt",
    "2RDM.txt",
    "3RDM.txt",
    "RestartFile.*",
    "Determinants.*",
    "*.log",
];

/// Scoped per-scenario working context. Holds the absolute scenario
/// directory; the process-global current directory is never changed, the
/// runner sets the directory on the child process instead.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    generated: GlobSet,
}

impl Workspace {
    pub fn enter(base_dir: &Path, scenario_dir: &str) -> HarnessResult<Self> {
        let dir = base_dir.join(scenario_dir);
        if !dir.is_dir() {
            return Err(HarnessError::io_system(
                "IO.WORKSPACE_MISSING",
                format!("scenario directory '{}' does not exist", dir.display()),
            ));
        }

        let dir = fs::canonicalize(&dir).map_err(|source| {
            HarnessError::io_system(
                "IO.WORKSPACE_RESOLVE",
                format!(
                    "failed to resolve scenario directory '{}': {}",
                    dir.display(),
                    source
                ),
            )
        })?;

        Ok(Self {
            dir,
            generated: compile_generated_set()?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes generated engine artifacts from the workspace. Failures are
    /// logged and swallowed so cleanup can never mask a scenario outcome;
    /// a file that was never produced is not an error.
    pub fn cleanup(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(source) => {
                warn!(
                    workspace = %self.dir.display(),
                    error = %source,
                    "failed to list workspace during cleanup"
                );
                return;
            }
        };

        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !self.generated.is_match(file_name) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => debug!(artifact = file_name, "removed generated artifact"),
                Err(source) => warn!(
                    artifact = file_name,
                    error = %source,
                    "failed to remove generated artifact"
                ),
            }
        }
    }

    /// True when `file_name` matches the generated-artifact set.
    pub fn is_generated(&self, file_name: &str) -> bool {
        self.generated.is_match(file_name)
    }
}

/// Runs `Workspace::cleanup` when dropped, so cleanup happens on every
/// exit path of a scenario, panics included.
pub struct CleanupGuard<'a> {
    workspace: &'a Workspace,
}

impl<'a> CleanupGuard<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.workspace.cleanup();
    }
}

fn compile_generated_set() -> HarnessResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in GENERATED_ARTIFACT_GLOBS {
        let glob = Glob::new(pattern).map_err(|source| {
            HarnessError::internal(
                "SYS.CLEANUP_GLOB",
                format!("invalid generated-artifact pattern '{}': {}", pattern, source),
            )
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| {
        HarnessError::internal(
            "SYS.CLEANUP_GLOB",
            format!("failed to compile generated-artifact set: {}", source),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{CleanupGuard, Workspace};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn scenario_workspace(temp: &TempDir) -> Workspace {
        fs::create_dir_all(temp.path().join("o2_det")).expect("scenario dir should be created");
        Workspace::enter(temp.path(), "o2_det").expect("workspace should enter")
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "x").expect("file should be written");
    }

    #[test]
    fn enter_rejects_missing_scenario_directory() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = Workspace::enter(temp.path(), "absent").expect_err("enter should fail");
        assert_eq!(error.code(), "IO.WORKSPACE_MISSING");
    }

    #[test]
    fn cleanup_removes_generated_files_and_keeps_inputs() {
        let temp = TempDir::new().expect("tempdir should be created");
        let workspace = scenario_workspace(&temp);
        let dir = workspace.dir().to_path_buf();

        touch(&dir, "shci.e");
        touch(&dir, "spatialRDM.0.0.txt");
        touch(&dir, "data.bkp");
        touch(&dir, "run.log");
        touch(&dir, "input.dat");
        touch(&dir, "FCIDUMP");
        touch(&dir, "trustedE.txt");
        touch(&dir, "trusted2RDM.txt");

        workspace.cleanup();

        assert!(!dir.join("shci.e").exists());
        assert!(!dir.join("spatialRDM.0.0.txt").exists());
        assert!(!dir.join("data.bkp").exists());
        assert!(!dir.join("run.log").exists());
        assert!(dir.join("input.dat").exists());
        assert!(dir.join("FCIDUMP").exists());
        assert!(dir.join("trustedE.txt").exists());
        assert!(dir.join("trusted2RDM.txt").exists());
    }

    #[test]
    fn cleanup_with_nothing_generated_is_not_an_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let workspace = scenario_workspace(&temp);
        workspace.cleanup();
        assert!(workspace.dir().is_dir());
    }

    #[test]
    fn guard_cleans_up_on_drop() {
        let temp = TempDir::new().expect("tempdir should be created");
        let workspace = scenario_workspace(&temp);
        touch(workspace.dir(), "shci.e");

        {
            let _guard = CleanupGuard::new(&workspace);
        }

        assert!(!workspace.dir().join("shci.e").exists());
    }

    #[test]
    fn reference_files_never_match_generated_set() {
        let temp = TempDir::new().expect("tempdir should be created");
        let workspace = scenario_workspace(&temp);

        for name in ["trustedE.txt", "trusted2RDM.txt", "input.dat", "FCIDUMP"] {
            assert!(!workspace.is_generated(name), "'{}' must survive cleanup", name);
        }
        for name in ["shci.e", "shci.log", "RestartFile.txt", "Determinants.bin"] {
            assert!(workspace.is_generated(name), "'{}' should be cleaned", name);
        }
    }
}
