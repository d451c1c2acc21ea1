//! Provisioner configuration.
//!
//! The configuration is a TOML file (`provision.toml`) in which every section
//! is optional; missing sections fall back to the values the LibreDWG
//! prebuild needs. Relative paths are resolved against the directory that
//! holds the configuration file.
//!
//! ```toml
//! workspace = "libs"
//! backend = "cli"
//!
//! [dependency]
//! origin = "https://github.com/LibreDWG/libredwg"
//! revision = "4340d0bcabc298ae1dca706040bf6998e59911c2"
//! name = "libredwg"
//!
//! [package.env]
//! CC = "clang"
//! CXX = "clang++"
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::{DependencyDescriptor, PatchSpec, SourceBackend};

pub use loader::{load_config_from_file, render_config, save_config_to_file};

/// Default file name looked up in the project directory.
pub const DEFAULT_CONFIG_FILE: &str = "provision.toml";

/// `git` executable settings for the CLI backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    pub program: String,
    pub depth: u32,
    /// Partial-clone filter spec, `None` disables filtering
    pub filter: Option<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        GitSettings {
            program: "git".to_string(),
            depth: 1,
            filter: Some("blob:none".to_string()),
        }
    }
}

/// Native build configuration step (CMake).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureSettings {
    pub program: String,
    pub build_type: String,
    pub generator: Option<String>,
    pub args: Vec<String>,
}

impl Default for ConfigureSettings {
    fn default() -> Self {
        ConfigureSettings {
            program: "cmake".to_string(),
            build_type: "Release".to_string(),
            generator: None,
            args: Vec::new(),
        }
    }
}

/// Packaging tool that compiles the loadable native module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    pub program: String,
    /// Leading arguments, before the strip/ABI flags
    pub args: Vec<String>,
    pub strip: bool,
    pub abi: String,
    /// Output directory scanned for the artifact, relative to the project dir
    pub artifact_dir: PathBuf,
    pub artifact_extension: String,
    /// Environment overrides, e.g. `CC = "clang"`
    pub env: BTreeMap<String, String>,
}

impl Default for PackageSettings {
    fn default() -> Self {
        PackageSettings {
            program: "npx".to_string(),
            args: vec!["prebuildify".to_string()],
            strip: true,
            abi: "napi".to_string(),
            artifact_dir: PathBuf::from("prebuilds"),
            artifact_extension: "node".to_string(),
            env: BTreeMap::new(),
        }
    }
}

/// Complete provisioner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Workspace root; wiped at the start of every run
    pub workspace: PathBuf,
    /// Directory the packaging tool runs in
    pub project_dir: PathBuf,
    pub backend: SourceBackend,
    pub dry_run: bool,
    /// Age after which a leftover run lock is considered abandoned
    pub lock_stale_after_secs: u64,
    pub dependency: DependencyDescriptor,
    pub patch: PatchSpec,
    pub git: GitSettings,
    pub configure: ConfigureSettings,
    pub package: PackageSettings,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        ProvisionConfig {
            workspace: PathBuf::from("libs"),
            project_dir: PathBuf::from("."),
            backend: SourceBackend::default(),
            dry_run: false,
            lock_stale_after_secs: 6 * 60 * 60,
            dependency: DependencyDescriptor::default(),
            patch: PatchSpec::default(),
            git: GitSettings::default(),
            configure: ConfigureSettings::default(),
            package: PackageSettings::default(),
        }
    }
}

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub origin: Option<String>,
    pub revision: Option<String>,
    pub name: Option<String>,
    pub backend: Option<SourceBackend>,
    pub env: Vec<(String, String)>,
    pub dry_run: bool,
}

impl ProvisionConfig {
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(workspace) = overrides.workspace {
            self.workspace = workspace;
        }
        if let Some(origin) = overrides.origin {
            self.dependency.origin = origin;
        }
        if let Some(revision) = overrides.revision {
            self.dependency.revision = revision;
        }
        if let Some(name) = overrides.name {
            self.dependency.name = name;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        for (key, value) in overrides.env {
            self.package.env.insert(key, value);
        }
        self.dry_run |= overrides.dry_run;
    }

    /// Make `workspace` and `project_dir` absolute, relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if self.workspace.is_relative() {
            self.workspace = base_dir.join(&self.workspace);
        }
        if self.project_dir.is_relative() {
            self.project_dir = base_dir.join(&self.project_dir);
        }
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dependency
            .validate()
            .map_err(ConfigError::ValidationFailed)?;

        if self.workspace.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "workspace path cannot be empty".to_string(),
            ));
        }

        let declaration = &self.patch.declaration;
        if declaration.trim().is_empty() || declaration.contains('\n') || declaration.contains('\r') {
            return Err(ConfigError::ValidationFailed(format!(
                "patch declaration must be a single non-empty line, got {:?}",
                declaration
            )));
        }
        if self.patch.target.is_absolute()
            || self
                .patch
                .target
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "patch target must be relative to the source tree: {}",
                self.patch.target.display()
            )));
        }

        if self.git.depth == 0 {
            return Err(ConfigError::ValidationFailed(
                "git depth must be at least 1".to_string(),
            ));
        }

        for (label, program) in [
            ("git", &self.git.program),
            ("configure", &self.configure.program),
            ("package", &self.package.program),
        ] {
            if program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} program cannot be empty",
                    label
                )));
            }
        }

        if self.package.abi.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "package ABI cannot be empty".to_string(),
            ));
        }

        for key in self.package.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ConfigError::ValidationFailed(format!(
                    "invalid environment variable name: {:?}",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// Parse a `KEY=VALUE` pair from the command line.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
