//! Phase 4: Configure - run CMake in a fresh `<source>/build` directory.

use std::path::{Path, PathBuf};

use crate::config::ConfigureSettings;
use crate::error::StepFailure;
use crate::orchestrator::executor::{run_command, CommandSpec};
use crate::system::recreate_dir;

/// Name of the build directory inside the source tree
pub const BUILD_DIR_NAME: &str = "build";

/// CMake configure invocation.
pub struct CmakeConfigure {
    settings: ConfigureSettings,
}

impl CmakeConfigure {
    pub fn new(settings: ConfigureSettings) -> Self {
        CmakeConfigure { settings }
    }

    pub fn build_dir(source: &Path) -> PathBuf {
        source.join(BUILD_DIR_NAME)
    }

    /// `cmake -S <source> -B <build> -DCMAKE_BUILD_TYPE=<type> [-G <gen>] [args..]`,
    /// run from inside the build directory.
    pub fn command(&self, source: &Path, build: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.settings.program, build)
            .arg("-S")
            .arg(source.to_string_lossy())
            .arg("-B")
            .arg(build.to_string_lossy())
            .arg(format!("-DCMAKE_BUILD_TYPE={}", self.settings.build_type));
        if let Some(generator) = &self.settings.generator {
            spec = spec.arg("-G").arg(generator.as_str());
        }
        spec.args(self.settings.args.iter().cloned())
    }

    /// Recreate the build directory and run the configure command.
    ///
    /// Returns the build directory.
    pub async fn run(&self, source: &Path) -> Result<PathBuf, StepFailure> {
        let build = Self::build_dir(source);
        recreate_dir(&build).map_err(|e| {
            StepFailure::new(format!(
                "failed to recreate build directory {}: {}",
                build.display(),
                e
            ))
        })?;
        log::info!("[Provision] [CONFIGURE] Fresh build directory {}", build.display());

        run_command(&self.command(source, &build)).await?;
        Ok(build)
    }
}
