//! Phase 5: Package - compile the loadable native module and find it.
//!
//! The packaging tool (prebuildify by default) runs in the project
//! directory and writes its output under `<project>/prebuilds`. The newest
//! file with the artifact extension written during this run is the result.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::PackageSettings;
use crate::error::StepFailure;
use crate::orchestrator::executor::{run_command, CommandSpec};

/// Parallel job count handed to the native build unless overridden
pub const JOBS_ENV: &str = "JOBS";

// Coarse filesystem timestamps can place a fresh artifact just before the run start
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Packaging tool invocation plus artifact discovery.
pub struct PackageTool {
    settings: PackageSettings,
}

impl PackageTool {
    pub fn new(settings: PackageSettings) -> Self {
        PackageTool { settings }
    }

    /// Packaging command run in `project`.
    pub fn command(&self, project: &Path) -> CommandSpec {
        let mut spec =
            CommandSpec::new(&self.settings.program, project).args(self.settings.args.iter().cloned());
        if self.settings.strip {
            spec = spec.arg("--strip");
        }
        spec = spec.arg(format!("--{}", self.settings.abi));

        if !self.settings.env.contains_key(JOBS_ENV) {
            spec = spec.env(JOBS_ENV, num_cpus::get().to_string());
        }
        for (key, value) in &self.settings.env {
            spec = spec.env(key.as_str(), value.as_str());
        }
        spec
    }

    pub fn artifact_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.settings.artifact_dir)
    }

    /// Newest artifact under the output directory, searched recursively.
    pub fn locate_artifact(&self, project: &Path) -> Option<PathBuf> {
        self.newest_artifact(project, SystemTime::UNIX_EPOCH)
    }

    fn newest_artifact(&self, project: &Path, not_before: SystemTime) -> Option<PathBuf> {
        let mut found = Vec::new();
        if let Err(e) = collect_files(&self.artifact_dir(project), &self.settings.artifact_extension, &mut found) {
            log::debug!("[Provision] [PACKAGE] Artifact scan stopped: {}", e);
        }
        found
            .into_iter()
            .filter(|(_, modified)| *modified + MTIME_SLACK >= not_before)
            .max_by_key(|(_, modified)| *modified)
            .map(|(path, _)| path)
    }

    /// Run the packaging tool and return the artifact it produced.
    pub async fn run(&self, project: &Path) -> Result<PathBuf, StepFailure> {
        let started = SystemTime::now();
        let spec = self.command(project);
        run_command(&spec).await?;

        match self.newest_artifact(project, started) {
            Some(artifact) => {
                log::info!("[Provision] [PACKAGE] Artifact: {}", artifact.display());
                Ok(artifact)
            }
            None => Err(StepFailure::new(format!(
                "{} succeeded but produced no *.{} file under {}",
                spec.program,
                self.settings.artifact_extension,
                self.artifact_dir(project).display()
            ))),
        }
    }
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<(PathBuf, SystemTime)>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().is_some_and(|ext| ext == extension) {
            out.push((path, entry.metadata()?.modified()?));
        }
    }
    Ok(())
}
