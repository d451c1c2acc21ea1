//! Core data types for the dependency provisioner.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

static COMMIT_HASH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{7,64}$").expect("Invalid commit hash regex"));

/// Whether `revision` looks like an (abbreviated) commit hash rather than a
/// branch or tag name.
pub fn is_commit_hash(revision: &str) -> bool {
    COMMIT_HASH_REGEX.is_match(revision)
}

/// A named step of the provisioning pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Clean,
    Fetch,
    Patch,
    Configure,
    Package,
}

impl Step {
    /// All steps in the order the pipeline runs them.
    pub const ALL: [Step; 5] = [
        Step::Clean,
        Step::Fetch,
        Step::Patch,
        Step::Configure,
        Step::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Clean => "clean",
            Step::Fetch => "fetch",
            Step::Patch => "patch",
            Step::Configure => "configure",
            Step::Package => "package",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The external dependency to provision: where it lives, which commit, and
/// the directory name it gets inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    pub origin: String,
    pub revision: String,
    pub name: String,
}

impl Default for DependencyDescriptor {
    fn default() -> Self {
        DependencyDescriptor {
            origin: "https://github.com/LibreDWG/libredwg".to_string(),
            revision: "4340d0bcabc298ae1dca706040bf6998e59911c2".to_string(),
            name: "libredwg".to_string(),
        }
    }
}

impl DependencyDescriptor {
    pub fn new(
        origin: impl Into<String>,
        revision: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        DependencyDescriptor {
            origin: origin.into(),
            revision: revision.into(),
            name: name.into(),
        }
    }

    /// Reject descriptors that cannot be handed to a version-control client
    /// or that would escape the workspace root.
    pub fn validate(&self) -> Result<(), String> {
        if self.origin.trim().is_empty() {
            return Err("origin URL is empty".to_string());
        }
        if self.origin.chars().any(char::is_whitespace) {
            return Err(format!("origin URL contains whitespace: {:?}", self.origin));
        }
        if self.origin.starts_with('-') {
            return Err(format!("origin URL may not start with '-': {}", self.origin));
        }

        if self.revision.trim().is_empty() {
            return Err("pinned revision is empty".to_string());
        }
        if self.revision.chars().any(char::is_whitespace) || self.revision.starts_with('-') {
            return Err(format!("invalid pinned revision: {:?}", self.revision));
        }

        let mut components = Path::new(&self.name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None)
                if !self.name.contains(|c: char| c == '/' || c == '\\') =>
            {
                Ok(())
            }
            _ => Err(format!(
                "dependency name must be a single directory name, got {:?}",
                self.name
            )),
        }
    }

    pub fn is_commit_hash(&self) -> bool {
        is_commit_hash(&self.revision)
    }

    /// Source tree location inside the given workspace root.
    pub fn source_dir(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.name)
    }
}

/// Optional compiler-version gate for the source patch.
///
/// The patch is a toolchain-compatibility shim: it is applied only when the
/// probed compiler's major version is at most `max_major`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainGate {
    pub compiler: String,
    pub max_major: u32,
}

/// A single-line declaration that must head a file in the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSpec {
    /// Path relative to the source tree root
    pub target: PathBuf,
    /// Line prepended (followed by a blank line) when missing
    pub declaration: String,
    pub gate: Option<ToolchainGate>,
}

impl Default for PatchSpec {
    fn default() -> Self {
        PatchSpec {
            target: PathBuf::from("src/dwg.spec"),
            declaration: "#include \"spec.h\"".to_string(),
            gate: None,
        }
    }
}

/// What the patch step did to the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    Applied,
    AlreadyPresent,
    SkippedByGate,
}

/// Which source-control implementation performs the fetch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    /// The `git` executable; supports blob-filtered partial clones
    #[default]
    Cli,
    /// Native libgit2 bindings
    Libgit2,
}

impl std::str::FromStr for SourceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" | "git" => Ok(SourceBackend::Cli),
            "libgit2" | "git2" => Ok(SourceBackend::Libgit2),
            other => Err(format!("unknown source backend '{}' (expected cli or libgit2)", other)),
        }
    }
}

/// Timing and outcome of one completed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub duration_ms: u64,
    pub detail: String,
}

/// Record of a provisioning run, serializable as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub descriptor: DependencyDescriptor,
    pub workspace_root: PathBuf,
    pub source_dir: PathBuf,
    pub head_commit: Option<String>,
    pub patch: Option<PatchOutcome>,
    pub artifact: Option<PathBuf>,
    pub steps: Vec<StepRecord>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
